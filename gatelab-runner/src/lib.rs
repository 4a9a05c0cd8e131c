//! GateLab Runner — orchestration around the core replay engine.
//!
//! - TOML run configuration with load-time validation
//! - Performance metrics (pure functions)
//! - CSV candle ingestion
//! - Parallel, isolated trial fan-out for external parameter searches
//! - Artifact export (JSON + CSV)

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;

pub use config::{RunConfig, RunConfigError};
pub use data_loader::{load_candles_csv, LoadError};
pub use metrics::PerformanceMetrics;
pub use runner::{run_trial, run_trials, RunError, TrialReport};
