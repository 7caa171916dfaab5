//! Runtime configuration.
//!
//! [`RuntimeConfig`] is plain serde data so hosts can embed it in their own
//! configuration files. With the `config-file` feature it can be read from
//! TOML directly:
//!
//! ```toml
//! step_budget = 100000
//! trace_effects = true
//!
//! [action_buffer]
//! policy = "sliding"
//! capacity = 64
//! ```

use crate::channel::BufferPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration text is malformed.
    #[cfg(feature = "config-file")]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Tunables for a [`Runtime`](crate::runtime::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Maximum run loop iterations per `run_until_idle` call. `None` runs
    /// until there is nothing left to do.
    pub step_budget: Option<u64>,
    /// Buffer used by `ACTION_CHANNEL` when the effect names none.
    pub action_buffer: BufferPolicy,
    /// Log every interpreted effect at debug level instead of trace.
    pub trace_effects: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            step_budget: None,
            action_buffer: BufferPolicy::Unbounded,
            trace_effects: false,
        }
    }
}

impl RuntimeConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_budget == Some(0) {
            return Err(ConfigError::Invalid("step_budget must be positive"));
        }
        if matches!(self.action_buffer, BufferPolicy::Fixed(0)) {
            return Err(ConfigError::Invalid(
                "action_buffer fixed(0) would reject every event",
            ));
        }
        Ok(())
    }

    /// Parses and validates TOML configuration text.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
