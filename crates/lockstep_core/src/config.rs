//! # Lockstep Configuration
//!
//! Loaded once at startup, before any worker is spawned.
//!
//! ```toml
//! [barrier]
//! participants = 8
//! label = "solver"
//!
//! [limits]
//! max_locks = 1024
//! max_queues = 1024
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BarrierError, BarrierResult};
use crate::sync::ResourceLimits;

/// Settings for a single barrier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarrierConfig {
    /// Workers that must arrive each round.
    pub participants: usize,
    /// Name used in log lines.
    pub label: String,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            participants: 1,
            label: String::new(),
        }
    }
}

impl BarrierConfig {
    /// Config for `participants` workers with a label.
    #[must_use]
    pub fn new(participants: usize, label: impl Into<String>) -> Self {
        Self {
            participants,
            label: label.into(),
        }
    }

    /// Checks the invariants a barrier relies on.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::InvalidConfig`] if `participants` is zero.
    pub fn validate(&self) -> BarrierResult<()> {
        if self.participants == 0 {
            return Err(BarrierError::InvalidConfig(
                "barrier.participants must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockstepConfig {
    /// The barrier to build.
    pub barrier: BarrierConfig,
    /// Limits for the resource ledger.
    pub limits: ResourceLimits,
}

impl LockstepConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> BarrierResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| BarrierError::InvalidConfig(e.to_string()))?;
        config.barrier.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> BarrierResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            BarrierError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), participants = config.barrier.participants, "config loaded");
        Ok(config)
    }
}
