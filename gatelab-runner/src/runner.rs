//! Trial orchestration — wires config, replay, and metrics together.
//!
//! One trial is one isolated replay run: its own state, its own cache, its
//! own sub-seed. An external search process supplies many configurations;
//! `run_trials` fans them out with rayon while keeping the result order
//! deterministic (results come back in input order, independent of thread
//! scheduling).

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatelab_core::config::StrategyConfig;
use gatelab_core::domain::{CandleSeries, ProbabilityProvider};
use gatelab_core::features::PrecomputedTable;
use gatelab_core::replay::{run_replay, BacktestArtifact, ReplayError, RunParams};
use gatelab_core::rng::SeedHierarchy;

use crate::config::RunConfig;
use crate::metrics::PerformanceMetrics;

/// Errors from a single trial.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("replay failed: {0}")]
    Replay(#[from] ReplayError),
}

/// Everything a caller gets back from one trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialReport {
    pub trial: usize,
    pub metrics: PerformanceMetrics,
    pub artifact: BacktestArtifact,
}

/// Run a single trial.
pub fn run_trial(
    series: &CandleSeries,
    strategy: &StrategyConfig,
    provider: &dyn ProbabilityProvider,
    table: Option<&PrecomputedTable>,
    params: &RunParams,
    trial: usize,
) -> Result<TrialReport, RunError> {
    let artifact = run_replay(series, strategy, provider, table, params)?;
    let metrics = PerformanceMetrics::compute(&artifact.equity_curve, &artifact.trades);
    Ok(TrialReport {
        trial,
        metrics,
        artifact,
    })
}

/// Run one configuration per trial slot from a run config.
///
/// Each trial derives its own seed from the master seed and the config
/// hash, so re-running any subset reproduces the same sub-seeds.
pub fn run_trials(
    series: &CandleSeries,
    config: &RunConfig,
    strategies: &[StrategyConfig],
    provider: &(dyn ProbabilityProvider + Sync),
    table: Option<&PrecomputedTable>,
) -> Vec<Result<TrialReport, RunError>> {
    let seeds = SeedHierarchy::new(config.seed);

    strategies
        .par_iter()
        .enumerate()
        .map(|(i, strategy)| {
            let params = RunParams {
                initial_capital: config.initial_capital,
                seed: seeds.sub_seed(&strategy.config_hash(), i as u64),
                build_id: env!("CARGO_PKG_VERSION").to_string(),
            };
            run_trial(series, strategy, provider, table, &params, i)
        })
        .collect()
}
