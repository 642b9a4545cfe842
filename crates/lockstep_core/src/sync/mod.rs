//! # Phase Synchronization
//!
//! ## The Problem
//!
//! ```text
//! Worker 1:  [phase N work]──────────┐      [phase N+1 work]
//! Worker 2:  [phase N work]───┐      │
//! Worker 3:  [phase N work]───┼──────┼──▶ nobody starts N+1
//!                             │      │    until all finish N
//! ```
//!
//! A naive counter barrier has to be reset between rounds, and a fast worker
//! re-entering before a slow one has left can slip through or deadlock.
//!
//! ## The Solution: Sense Reversal
//!
//! Every participant carries a private sense bit that flips on each `wait`.
//! The last arrival resets the counter and publishes its sense in one locked
//! step, so a round is identified by the bit rather than by the counter.

mod barrier;
pub mod ledger;

pub use barrier::{Barrier, Participant, WaitOutcome};
pub use ledger::{ResourceLedger, ResourceLimits, ResourceSlot};
