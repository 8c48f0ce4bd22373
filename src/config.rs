//! Simulator configuration.
//!
//! Loaded from JSON when a config file is given, then overridden by
//! command-line flags.

use crate::cpu::memory::DEFAULT_MEMORY_SIZE;
use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// Tunables for one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Data memory capacity in bytes. Also the initial stack pointer.
    pub memory_size: usize,
    /// Abort the run once this many instructions have executed.
    pub max_steps: Option<u64>,
    /// Render the per-step trace table.
    pub trace: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            max_steps: None,
            trace: false,
        }
    }
}

impl SimConfig {
    /// Parse a configuration from JSON. Missing fields take defaults.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Check that the configuration describes a usable machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_size == 0 || self.memory_size % 4 != 0 {
            return Err(ConfigError::Invalid(format!(
                "memory_size must be a non-zero multiple of 4, got {}",
                self.memory_size
            )));
        }
        // sp starts at memory_size, which must fit a register
        if u32::try_from(self.memory_size).is_err() {
            return Err(ConfigError::Invalid(format!(
                "memory_size {} does not fit in a 32-bit register",
                self.memory_size
            )));
        }
        if self.max_steps == Some(0) {
            return Err(ConfigError::Invalid("max_steps must be at least 1".into()));
        }
        Ok(())
    }
}

/// Errors that can occur while loading a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimConfig::default();
        assert_eq!(config.memory_size, 4096);
        assert_eq!(config.max_steps, None);
        assert!(!config.trace);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimConfig::from_json_str(r#"{ "max_steps": 1000 }"#).unwrap();
        assert_eq!(config.memory_size, 4096);
        assert_eq!(config.max_steps, Some(1000));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = SimConfig::from_json_str(r#"{ "memory": 10 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_bad_memory_size() {
        let err = SimConfig::from_json_str(r#"{ "memory_size": 1001 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = SimConfig { memory_size: 0, ..SimConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = SimConfig::from_json_file("/nonexistent/rv32-sim.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
