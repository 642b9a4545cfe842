//! # Lockstep Error Types
//!
//! All errors that can occur while setting up or tearing down a barrier.
//!
//! `wait` has no failure outcome: a round either completes for every
//! participant or the group stalls awaiting the missing arrival.

use std::fmt;

use thiserror::Error;

/// The kind of host resource a barrier owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// The mutual-exclusion lock guarding the round state.
    Lock,
    /// The wait-queue participants block on.
    WaitQueue,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lock => f.write_str("lock"),
            Self::WaitQueue => f.write_str("wait-queue"),
        }
    }
}

/// Failure to allocate or release the lock / wait-queue behind a barrier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The ledger has no room left for another resource of this kind.
    #[error("{kind} exhausted: limit of {limit} live resources reached")]
    Exhausted {
        /// Which resource could not be allocated.
        kind: ResourceKind,
        /// The configured limit.
        limit: usize,
    },

    /// The ledger no longer accounts for a resource being released.
    #[error("{kind} release failed: resource is not live in its ledger")]
    Release {
        /// Which resource could not be released.
        kind: ResourceKind,
    },

    /// Teardown requested while other handles to the barrier still exist.
    #[error("barrier busy: {handles} other handle(s) still alive")]
    Busy {
        /// Number of other handles observed.
        handles: usize,
    },

    /// Both resources failed to release.
    #[error("teardown failed: {lock}; {queue}")]
    Teardown {
        /// The lock release failure.
        lock: Box<ResourceError>,
        /// The wait-queue release failure.
        queue: Box<ResourceError>,
    },
}

/// Errors that can occur in the lockstep crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BarrierError {
    /// Lock or wait-queue allocation / release failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BarrierError {
    /// Returns the underlying resource error, if any.
    #[must_use]
    pub fn as_resource(&self) -> Option<&ResourceError> {
        match self {
            Self::Resource(err) => Some(err),
            Self::InvalidConfig(_) => None,
        }
    }
}

/// Result type for lockstep operations.
pub type BarrierResult<T> = Result<T, BarrierError>;
