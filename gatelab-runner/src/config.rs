//! Serializable run configuration loaded from TOML.
//!
//! Everything a run needs is explicit here; nothing is derived from the
//! environment. Strategy validation happens at load time so a bad config
//! never reaches the replay loop.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use gatelab_core::config::{ConfigError, StrategyConfig};

/// Errors from loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid strategy config: {0}")]
    Strategy(#[from] ConfigError),
    #[error("initial_capital must be positive, got {0}")]
    BadCapital(f64),
    #[error("trials must be >= 1")]
    NoTrials,
}

/// Complete configuration for a batch of replay runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Symbol label carried into artifacts (the series itself is loaded
    /// separately and hashed independently).
    pub symbol: String,
    pub initial_capital: f64,
    /// Master seed; per-trial sub-seeds derive from it deterministically.
    pub seed: u64,
    /// Number of trials when fanning out (1 for a single run).
    pub trials: usize,
    pub strategy: StrategyConfig,
}

impl RunConfig {
    pub fn single(symbol: impl Into<String>, strategy: StrategyConfig) -> Self {
        Self {
            symbol: symbol.into(),
            initial_capital: 10_000.0,
            seed: 0,
            trials: 1,
            strategy,
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RunConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, RunConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), RunConfigError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(RunConfigError::BadCapital(self.initial_capital));
        }
        if self.trials == 0 {
            return Err(RunConfigError::NoTrials);
        }
        self.strategy.validate()?;
        Ok(())
    }
}
