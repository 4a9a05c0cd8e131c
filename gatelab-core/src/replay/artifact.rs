//! Backtest artifact — everything needed to reproduce a run bit-for-bit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::FeatureMode;
use crate::domain::{ConfigHash, DatasetHash, RunId, TradeRecord};

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Execution metadata identifying a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub mode: FeatureMode,
    pub config_hash: ConfigHash,
    pub dataset_hash: DatasetHash,
    pub seed: u64,
    /// Build identifier supplied by the caller (package version, git sha).
    pub build_id: String,
    /// Collapsed run identity (config + dataset + seed).
    pub run_id: String,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunMetadata {
    pub fn new(
        mode: FeatureMode,
        config_hash: ConfigHash,
        dataset_hash: DatasetHash,
        seed: u64,
        build_id: impl Into<String>,
    ) -> Self {
        let run_id = RunId::new(config_hash.clone(), dataset_hash.clone(), seed).hash();
        Self {
            schema_version: SCHEMA_VERSION,
            mode,
            config_hash,
            dataset_hash,
            seed,
            build_id: build_id.into(),
            run_id,
        }
    }
}

/// Diagnostics materialized as data — warnings are fields, never stdout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayDiagnostics {
    pub bars_processed: usize,
    /// Per-bar computation errors (counted against the error-rate ceiling).
    pub error_count: usize,
    /// Bars that failed safe with a MISSING_DATA decision.
    pub missing_data_bars: usize,
    /// Field name → count of bars it was the missing input on.
    pub missing_data_fields: BTreeMap<String, usize>,
    /// Set once when Recompute mode fell back to the slow path.
    pub fallback_warning: Option<String>,
    /// Decision reason → occurrence count, keyed by the wire spelling.
    pub reason_counts: BTreeMap<String, usize>,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Complete result of one replay run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestArtifact {
    pub metadata: RunMetadata,
    /// Equity at each bar close, starting at the configured capital.
    pub equity_curve: Vec<f64>,
    pub trades: Vec<TradeRecord>,
    pub final_equity: f64,
    pub diagnostics: ReplayDiagnostics,
}

impl BacktestArtifact {
    /// Canonical serialization; two artifacts from identical runs are
    /// byte-identical here.
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
