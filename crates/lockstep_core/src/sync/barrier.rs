//! # Sense-Reversal Barrier
//!
//! A rendezvous point for a fixed group of workers, reusable round after
//! round without re-initialization.
//!
//! ## Architecture
//!
//! ```text
//!   ┌─────────────────────────── Barrier ────────────────────────────┐
//!   │  total_participants (fixed)                                    │
//!   │  ┌──────────── Mutex<RoundState> ────────────┐  ┌───────────┐  │
//!   │  │ pending_arrivals   round_sense   rounds   │──│  Condvar  │  │
//!   │  └───────────────────────────────────────────┘  └───────────┘  │
//!   └────────────────────────────────────────────────────────────────┘
//!            ▲                    ▲                    ▲
//!      ┌─────┴─────┐        ┌─────┴─────┐        ┌─────┴─────┐
//!      │Participant│        │Participant│        │Participant│
//!      │local_sense│        │local_sense│        │local_sense│
//!      └───────────┘        └───────────┘        └───────────┘
//! ```
//!
//! ## Round Protocol
//!
//! Each participant flips its private `local_sense` before arriving. The last
//! arrival resets the counter, publishes its sense as the shared
//! `round_sense` and wakes everyone, all inside one critical section. Every
//! other arrival sleeps until `round_sense` matches its own sense. Because the
//! senses alternate, "the round I just finished" and "the round I am entering"
//! can never be confused, even when a fast participant re-enters before a
//! slow one has woken up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::config::BarrierConfig;
use crate::error::{BarrierResult, ResourceError, ResourceKind};
use crate::sync::ledger::{ResourceLedger, ResourceSlot};

static NEXT_BARRIER_ID: AtomicU64 = AtomicU64::new(0);

/// Shared state of the current round. Only touched under the barrier lock.
#[derive(Debug)]
struct RoundState {
    /// Participants not yet arrived this round, in `[0, total_participants]`.
    pending_arrivals: usize,
    /// Generation bit, flipped once per completed round.
    round_sense: bool,
    rounds_completed: u64,
    /// Participants currently parked on the wait-queue.
    waiting: usize,
}

/// Reusable barrier for a fixed number of participants.
///
/// Share it between workers by reference (scoped threads) or through an
/// [`Arc`]. Each worker obtains its own [`Participant`] token with
/// [`Barrier::join`] and passes it to every [`Barrier::wait`] call.
///
/// ## Usage
///
/// ```rust
/// use lockstep_core::Barrier;
///
/// let barrier = Barrier::init(4).unwrap();
///
/// std::thread::scope(|s| {
///     for _ in 0..4 {
///         let mut me = barrier.join();
///         let barrier = &barrier;
///         s.spawn(move || {
///             for _ in 0..10 {
///                 // phase work...
///                 let _ = barrier.wait(&mut me);
///             }
///         });
///     }
/// });
///
/// assert_eq!(barrier.rounds_completed(), 10);
/// barrier.destroy().unwrap();
/// ```
#[derive(Debug)]
pub struct Barrier {
    id: u64,
    total_participants: usize,
    label: String,
    state: Mutex<RoundState>,
    queue: Condvar,
    lock_slot: ResourceSlot,
    queue_slot: ResourceSlot,
}

/// Private per-participant state, threaded through every [`Barrier::wait`].
///
/// Never shared: each worker owns exactly one token per barrier.
#[derive(Debug)]
pub struct Participant {
    barrier_id: u64,
    /// Round that was open when the token was handed out.
    join_round: u64,
    local_sense: bool,
    rounds_waited: u64,
}

impl Participant {
    /// The sense this participant used on its latest `wait`.
    #[inline]
    #[must_use]
    pub fn local_sense(&self) -> bool {
        self.local_sense
    }

    /// How many times this participant has called `wait`.
    #[inline]
    #[must_use]
    pub fn rounds_waited(&self) -> u64 {
        self.rounds_waited
    }
}

/// What a participant learns when it leaves a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "the last-arrival flag elects a per-round leader"]
pub struct WaitOutcome {
    last_arrival: bool,
    round: u64,
}

impl WaitOutcome {
    /// `true` for exactly one participant per round: the one that completed it.
    #[inline]
    #[must_use]
    pub fn is_last_arrival(&self) -> bool {
        self.last_arrival
    }

    /// Index of the round this call took part in, starting at 0.
    #[inline]
    #[must_use]
    pub fn round(&self) -> u64 {
        self.round
    }
}

impl Barrier {
    /// Creates a barrier for `total_participants` workers, accounted against
    /// the process-wide [`ResourceLedger::global`].
    ///
    /// # Errors
    ///
    /// Returns a resource error if the lock or wait-queue cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if `total_participants` is zero.
    pub fn init(total_participants: usize) -> BarrierResult<Self> {
        Self::init_in(total_participants, ResourceLedger::global())
    }

    /// Creates a barrier accounted against `ledger`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Exhausted`] if `ledger` has no room for the
    /// lock or the wait-queue. Nothing stays allocated on failure.
    ///
    /// # Panics
    ///
    /// Panics if `total_participants` is zero.
    pub fn init_in(total_participants: usize, ledger: &Arc<ResourceLedger>) -> BarrierResult<Self> {
        assert!(total_participants > 0, "Barrier needs at least one participant");
        Self::build(total_participants, String::new(), ledger)
    }

    /// Creates a barrier from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is invalid, or a resource
    /// error if `ledger` is exhausted.
    pub fn from_config(config: &BarrierConfig, ledger: &Arc<ResourceLedger>) -> BarrierResult<Self> {
        config.validate()?;
        Self::build(config.participants, config.label.clone(), ledger)
    }

    fn build(
        total_participants: usize,
        label: String,
        ledger: &Arc<ResourceLedger>,
    ) -> BarrierResult<Self> {
        let lock_slot = ledger.acquire(ResourceKind::Lock)?;
        // On failure the lock slot goes back to the ledger when dropped here.
        let queue_slot = ledger.acquire(ResourceKind::WaitQueue)?;

        let id = NEXT_BARRIER_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, label = %label, total_participants, "barrier initialized");

        Ok(Self {
            id,
            total_participants,
            label,
            state: Mutex::new(RoundState {
                pending_arrivals: total_participants,
                round_sense: false,
                rounds_completed: 0,
                waiting: 0,
            }),
            queue: Condvar::new(),
            lock_slot,
            queue_slot,
        })
    }

    /// Number of workers that must arrive each round.
    #[inline]
    #[must_use]
    pub fn total_participants(&self) -> usize {
        self.total_participants
    }

    /// Label given through configuration; empty when built with `init`.
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Participants still expected in the current round.
    #[must_use]
    pub fn pending_arrivals(&self) -> usize {
        self.state.lock().pending_arrivals
    }

    /// Rounds completed so far.
    #[must_use]
    pub fn rounds_completed(&self) -> u64 {
        self.state.lock().rounds_completed
    }

    /// Participants currently blocked in `wait`.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting
    }

    /// Hands out a participant token for this barrier.
    ///
    /// The token starts on the barrier's current sense, so its first `wait`
    /// enters the round that is currently open.
    #[must_use]
    pub fn join(&self) -> Participant {
        let state = self.state.lock();
        Participant {
            barrier_id: self.id,
            join_round: state.rounds_completed,
            local_sense: state.round_sense,
            rounds_waited: 0,
        }
    }

    /// Blocks until all `total_participants` workers have called `wait` for
    /// the current round, then releases them together.
    ///
    /// Exactly one caller per round gets an outcome with
    /// [`WaitOutcome::is_last_arrival`] set. Everything a participant did
    /// before its `wait` in round N happens-before everything any participant
    /// does after returning from round N.
    ///
    /// There is no timeout: if a participant never arrives, the rest of the
    /// group stays blocked.
    ///
    /// In debug builds, a token arriving in a round other than its own (more
    /// tokens than participants, or a token that skipped a round) panics
    /// instead of stalling the group silently.
    pub fn wait(&self, participant: &mut Participant) -> WaitOutcome {
        debug_assert_eq!(
            participant.barrier_id, self.id,
            "participant token used with a different barrier"
        );
        let expected_round = participant.join_round + participant.rounds_waited;
        participant.local_sense = !participant.local_sense;
        participant.rounds_waited += 1;
        let local_sense = participant.local_sense;

        let mut state = self.state.lock();
        let round = state.rounds_completed;
        debug_assert_eq!(
            round, expected_round,
            "token arrived in the wrong round: participant count mismatch"
        );
        state.pending_arrivals -= 1;

        if state.pending_arrivals == 0 {
            state.pending_arrivals = self.total_participants;
            debug_assert_ne!(
                state.round_sense, local_sense,
                "round sense must flip: participant count mismatch"
            );
            state.round_sense = local_sense;
            state.rounds_completed += 1;
            self.queue.notify_all();
            drop(state);

            tracing::trace!(id = self.id, label = %self.label, round, "round completed");
            return WaitOutcome {
                last_arrival: true,
                round,
            };
        }

        state.waiting += 1;
        // Spurious wakeups land back here.
        while state.round_sense != local_sense {
            self.queue.wait(&mut state);
        }
        state.waiting -= 1;

        WaitOutcome {
            last_arrival: false,
            round,
        }
    }

    /// Releases the lock and wait-queue.
    ///
    /// Both releases are attempted even when the first one fails.
    ///
    /// # Errors
    ///
    /// Returns a resource error if either release failed; when both did, the
    /// error is [`ResourceError::Teardown`] carrying each cause.
    pub fn destroy(self) -> BarrierResult<()> {
        let Self {
            id,
            total_participants,
            label,
            lock_slot,
            queue_slot,
            ..
        } = self;

        let lock = lock_slot.release();
        let queue = queue_slot.release();

        match (lock, queue) {
            (Ok(()), Ok(())) => {
                tracing::debug!(id, label = %label, total_participants, "barrier destroyed");
                Ok(())
            }
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err.into()),
            (Err(lock), Err(queue)) => Err(ResourceError::Teardown {
                lock: Box::new(lock),
                queue: Box::new(queue),
            }
            .into()),
        }
    }

    /// Destroys a shared barrier if `this` is its only handle.
    ///
    /// If other handles are still alive, nothing is torn down, this handle is
    /// dropped, and the resources go back to the ledger with the last one.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Busy`] when other handles exist, or any error
    /// [`Barrier::destroy`] reports.
    pub fn destroy_shared(this: Arc<Self>) -> BarrierResult<()> {
        match Arc::try_unwrap(this) {
            Ok(barrier) => barrier.destroy(),
            Err(shared) => {
                let handles = Arc::strong_count(&shared).saturating_sub(1);
                tracing::debug!(id = shared.id, handles, "destroy refused: barrier still shared");
                Err(ResourceError::Busy { handles }.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BarrierError;
    use crate::sync::ledger::ResourceLimits;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_barrier_creation() {
        let ledger = ResourceLedger::unbounded();
        let barrier = Barrier::init_in(3, &ledger).unwrap();

        assert_eq!(barrier.total_participants(), 3);
        assert_eq!(barrier.pending_arrivals(), 3);
        assert_eq!(barrier.rounds_completed(), 0);
        assert_eq!(barrier.waiting(), 0);
        assert_eq!(ledger.live_locks(), 1);
        assert_eq!(ledger.live_queues(), 1);

        barrier.destroy().unwrap();
        assert_eq!(ledger.live_locks(), 0);
        assert_eq!(ledger.live_queues(), 0);
    }

    #[test]
    #[should_panic(expected = "at least one participant")]
    fn test_zero_participants_panics() {
        let _ = Barrier::init_in(0, &ResourceLedger::unbounded());
    }

    #[test]
    fn test_single_participant_is_always_last() {
        let barrier = Barrier::init_in(1, &ResourceLedger::unbounded()).unwrap();
        let mut me = barrier.join();

        for round in 0..50 {
            let outcome = barrier.wait(&mut me);
            assert!(outcome.is_last_arrival());
            assert_eq!(outcome.round(), round);
        }
        assert_eq!(me.rounds_waited(), 50);
        assert_eq!(barrier.rounds_completed(), 50);
    }

    #[test]
    fn test_sense_alternates() {
        let barrier = Barrier::init_in(1, &ResourceLedger::unbounded()).unwrap();
        let mut me = barrier.join();
        assert!(!me.local_sense());

        let _ = barrier.wait(&mut me);
        assert!(me.local_sense());
        let _ = barrier.wait(&mut me);
        assert!(!me.local_sense());
    }

    #[test]
    fn test_join_after_rounds_matches_open_round() {
        let barrier = Barrier::init_in(1, &ResourceLedger::unbounded()).unwrap();
        let mut first = barrier.join();
        let _ = barrier.wait(&mut first);

        // Round sense is now `true`; a late token must start there.
        let mut late = barrier.join();
        assert!(late.local_sense());
        let outcome = barrier.wait(&mut late);
        assert!(outcome.is_last_arrival());
        assert_eq!(outcome.round(), 1);
    }

    #[test]
    fn test_one_leader_per_round() {
        const PARTICIPANTS: usize = 4;
        const ROUNDS: u64 = 200;

        let barrier = Barrier::init_in(PARTICIPANTS, &ResourceLedger::unbounded()).unwrap();
        let leaders = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..PARTICIPANTS {
                let mut me = barrier.join();
                let (barrier, leaders) = (&barrier, &leaders);
                s.spawn(move || {
                    for round in 0..ROUNDS {
                        let outcome = barrier.wait(&mut me);
                        assert_eq!(outcome.round(), round);
                        if outcome.is_last_arrival() {
                            leaders.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(leaders.load(Ordering::Relaxed), ROUNDS as usize);
        assert_eq!(barrier.rounds_completed(), ROUNDS);
        assert_eq!(barrier.pending_arrivals(), PARTICIPANTS);
        assert_eq!(barrier.waiting(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "participant count mismatch")]
    fn test_out_of_phase_token_panics() {
        let barrier = Barrier::init_in(1, &ResourceLedger::unbounded()).unwrap();
        let mut a = barrier.join();
        let mut b = barrier.join();

        let _ = barrier.wait(&mut a);
        // `b` was handed out for round 0, which `a` already completed alone.
        let _ = barrier.wait(&mut b);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "participant count mismatch")]
    fn test_surplus_token_panics() {
        let barrier = Arc::new(Barrier::init_in(2, &ResourceLedger::unbounded()).unwrap());
        let mut a = barrier.join();
        let mut b = barrier.join();
        let mut c = barrier.join();

        // Left parked in round 1 once the surplus arrival panics.
        let worker = Arc::clone(&barrier);
        let _parked = thread::spawn(move || {
            let _ = worker.wait(&mut a);
            let _ = worker.wait(&mut a);
        });

        let _ = barrier.wait(&mut b);
        assert_eq!(barrier.rounds_completed(), 1);
        let _ = barrier.wait(&mut c);
    }

    #[test]
    fn test_spurious_wakeups_do_not_release() {
        let barrier = Arc::new(Barrier::init_in(2, &ResourceLedger::unbounded()).unwrap());
        let mut first = barrier.join();
        let mut second = barrier.join();

        let parked = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait(&mut first))
        };

        let deadline = Instant::now() + Duration::from_secs(30);
        while barrier.waiting() < 1 {
            assert!(Instant::now() < deadline, "participant never parked");
            thread::yield_now();
        }

        for _ in 0..50 {
            barrier.queue.notify_all();
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(20));
        assert!(!parked.is_finished());
        assert_eq!(barrier.waiting(), 1);
        assert_eq!(barrier.pending_arrivals(), 1);

        assert!(barrier.wait(&mut second).is_last_arrival());
        let outcome = parked.join().unwrap();
        assert!(!outcome.is_last_arrival());
        assert_eq!(outcome.round(), 0);
    }

    #[test]
    fn test_init_exhaustion_releases_partial() {
        let ledger = ResourceLedger::with_limits(ResourceLimits {
            max_locks: None,
            max_queues: Some(0),
        });

        let err = Barrier::init_in(2, &ledger).unwrap_err();
        assert_eq!(
            err,
            BarrierError::Resource(ResourceError::Exhausted {
                kind: ResourceKind::WaitQueue,
                limit: 0,
            })
        );
        assert_eq!(ledger.live_locks(), 0);
        assert_eq!(ledger.live_queues(), 0);
    }

    #[test]
    fn test_destroy_attempts_both_releases() {
        let ledger = ResourceLedger::unbounded();
        let barrier = Barrier::init_in(2, &ledger).unwrap();

        ledger.forget_live();

        let err = barrier.destroy().unwrap_err();
        assert_eq!(
            err,
            BarrierError::Resource(ResourceError::Teardown {
                lock: Box::new(ResourceError::Release { kind: ResourceKind::Lock }),
                queue: Box::new(ResourceError::Release { kind: ResourceKind::WaitQueue }),
            })
        );
    }

    #[test]
    fn test_destroy_shared_refuses_while_shared() {
        let ledger = ResourceLedger::unbounded();
        let barrier = Arc::new(Barrier::init_in(2, &ledger).unwrap());
        let other = Arc::clone(&barrier);

        let err = Barrier::destroy_shared(barrier).unwrap_err();
        assert_eq!(err, BarrierError::Resource(ResourceError::Busy { handles: 1 }));
        assert_eq!(ledger.live_locks(), 1);

        Barrier::destroy_shared(other).unwrap();
        assert_eq!(ledger.live_locks(), 0);
        assert_eq!(ledger.live_queues(), 0);
    }

    #[test]
    fn test_drop_returns_resources() {
        let ledger = ResourceLedger::unbounded();
        {
            let _barrier = Barrier::init_in(8, &ledger).unwrap();
            assert_eq!(ledger.live_locks(), 1);
        }
        assert_eq!(ledger.live_locks(), 0);
        assert_eq!(ledger.live_queues(), 0);
    }
}
