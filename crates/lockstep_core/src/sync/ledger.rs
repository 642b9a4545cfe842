//! # Resource Ledger
//!
//! Accounting for the lock and wait-queue every barrier owns.
//!
//! `parking_lot` primitives never fail to construct, so host resource
//! exhaustion is modelled here: each barrier takes one [`ResourceKind::Lock`]
//! slot and one [`ResourceKind::WaitQueue`] slot from a ledger, and gives
//! both back on teardown. A bounded ledger refuses slots past its limit,
//! which is how `init` reports `ResourceError::Exhausted`.
//!
//! ```text
//!   Barrier::init ──acquire(Lock)──┐
//!                 ──acquire(Queue)─┤        ┌──────────────────┐
//!                                  ├───────▶│  ResourceLedger  │
//!   Barrier::destroy ──release()───┤        │  live_locks      │
//!                    ──release()───┘        │  live_queues     │
//!                                           └──────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::error::{ResourceError, ResourceKind};

/// Upper bounds on live resources in a ledger.
///
/// `None` means unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum number of live locks.
    pub max_locks: Option<usize>,
    /// Maximum number of live wait-queues.
    pub max_queues: Option<usize>,
}

impl ResourceLimits {
    /// Same limit for both kinds.
    #[must_use]
    pub const fn uniform(max: usize) -> Self {
        Self {
            max_locks: Some(max),
            max_queues: Some(max),
        }
    }

    #[inline]
    fn limit(&self, kind: ResourceKind) -> Option<usize> {
        match kind {
            ResourceKind::Lock => self.max_locks,
            ResourceKind::WaitQueue => self.max_queues,
        }
    }
}

/// Counts live locks and wait-queues handed out to barriers.
#[derive(Debug)]
pub struct ResourceLedger {
    limits: ResourceLimits,
    live_locks: AtomicUsize,
    live_queues: AtomicUsize,
    /// Every slot ever handed out, both kinds.
    total_acquired: AtomicU64,
}

static GLOBAL_LEDGER: OnceLock<Arc<ResourceLedger>> = OnceLock::new();

impl ResourceLedger {
    /// Creates a ledger with no limits.
    #[must_use]
    pub fn unbounded() -> Arc<Self> {
        Self::with_limits(ResourceLimits::default())
    }

    /// Creates a ledger enforcing `limits`.
    #[must_use]
    pub fn with_limits(limits: ResourceLimits) -> Arc<Self> {
        Arc::new(Self {
            limits,
            live_locks: AtomicUsize::new(0),
            live_queues: AtomicUsize::new(0),
            total_acquired: AtomicU64::new(0),
        })
    }

    /// The process-wide unbounded ledger used by [`Barrier::init`](super::Barrier::init).
    #[must_use]
    pub fn global() -> &'static Arc<Self> {
        GLOBAL_LEDGER.get_or_init(Self::unbounded)
    }

    /// Returns the configured limits.
    #[inline]
    #[must_use]
    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    /// Number of locks currently live.
    #[inline]
    #[must_use]
    pub fn live_locks(&self) -> usize {
        self.live_locks.load(Ordering::Acquire)
    }

    /// Number of wait-queues currently live.
    #[inline]
    #[must_use]
    pub fn live_queues(&self) -> usize {
        self.live_queues.load(Ordering::Acquire)
    }

    /// Number of live resources of `kind`.
    #[inline]
    #[must_use]
    pub fn live(&self, kind: ResourceKind) -> usize {
        self.counter(kind).load(Ordering::Acquire)
    }

    /// Total slots handed out over the ledger's lifetime.
    #[inline]
    #[must_use]
    pub fn total_acquired(&self) -> u64 {
        self.total_acquired.load(Ordering::Relaxed)
    }

    /// Takes one slot of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Exhausted`] when the limit for `kind` is reached.
    pub fn acquire(self: &Arc<Self>, kind: ResourceKind) -> Result<ResourceSlot, ResourceError> {
        let limit = self.limits.limit(kind);
        self.counter(kind)
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| match limit {
                Some(max) if live >= max => None,
                _ => live.checked_add(1),
            })
            .map_err(|_| ResourceError::Exhausted {
                kind,
                limit: limit.unwrap_or(usize::MAX),
            })?;
        self.total_acquired.fetch_add(1, Ordering::Relaxed);

        Ok(ResourceSlot {
            ledger: Arc::clone(self),
            kind,
            released: false,
        })
    }

    fn release(&self, kind: ResourceKind) -> Result<(), ResourceError> {
        self.counter(kind)
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| live.checked_sub(1))
            .map(|_| ())
            .map_err(|_| ResourceError::Release { kind })
    }

    #[inline]
    fn counter(&self, kind: ResourceKind) -> &AtomicUsize {
        match kind {
            ResourceKind::Lock => &self.live_locks,
            ResourceKind::WaitQueue => &self.live_queues,
        }
    }

    /// Forgets every live slot, so later releases no longer match.
    #[cfg(test)]
    pub(crate) fn forget_live(&self) {
        self.live_locks.store(0, Ordering::Release);
        self.live_queues.store(0, Ordering::Release);
    }
}

/// One live resource taken from a [`ResourceLedger`].
///
/// Released explicitly with [`ResourceSlot::release`], or on drop.
#[derive(Debug)]
pub struct ResourceSlot {
    ledger: Arc<ResourceLedger>,
    kind: ResourceKind,
    released: bool,
}

impl ResourceSlot {
    /// Which resource this slot stands for.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Gives the slot back to its ledger.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Release`] if the ledger no longer counts this
    /// slot as live.
    pub fn release(mut self) -> Result<(), ResourceError> {
        self.released = true;
        self.ledger.release(self.kind)
    }
}

impl Drop for ResourceSlot {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.ledger.release(self.kind) {
            Ok(()) => tracing::trace!(kind = %self.kind, "resource slot released on drop"),
            Err(err) => {
                tracing::warn!(%err, "resource slot dropped without a live ledger entry");
            }
        }
    }
}
