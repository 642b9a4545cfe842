//! # LOCKSTEP Core
//!
//! Reusable barrier for parallel algorithms organized in lock-step phases:
//! iterative numerical kernels, generational simulations, double-buffer
//! swaps. Every worker finishes phase N before any worker starts phase N+1.
//!
//! ## Rules
//!
//! 1. **Fixed membership** - the participant count is set once at `init`
//! 2. **Explicit per-worker state** - each worker threads its own
//!    [`Participant`] token through every `wait`
//! 3. **No timeouts** - a round completes for everyone or the group waits
//!
//! ## Example
//!
//! ```rust
//! use lockstep_core::Barrier;
//!
//! let barrier = Barrier::init(1)?;
//! let mut me = barrier.join();
//! assert!(barrier.wait(&mut me).is_last_arrival());
//! barrier.destroy()?;
//! # Ok::<(), lockstep_core::BarrierError>(())
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod sync;

pub use config::{BarrierConfig, LockstepConfig};
pub use error::{BarrierError, BarrierResult, ResourceError, ResourceKind};
pub use sync::{Barrier, Participant, ResourceLedger, ResourceLimits, ResourceSlot, WaitOutcome};
