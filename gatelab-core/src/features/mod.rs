//! Feature extraction — as-of feature vectors from candle windows.
//!
//! The extractor never reads past the bar it is reporting for; every value
//! in an emitted vector is finite (NaN inputs surface as `MissingData`
//! errors before the gates, never as NaN leaking downstream).

pub mod extractor;
pub mod precomputed;

pub use extractor::{FeatureError, FeatureExtractor, FeatureSource, FAST_SLOW_TOLERANCE};
pub use precomputed::PrecomputedTable;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical feature names, fixed independent of indicator periods.
pub mod names {
    pub const CLOSE: &str = "close";
    pub const ATR: &str = "atr";
    /// Percentile rank of ATR within its rolling window, in [0, 1).
    pub const ATR_PCT: &str = "atr_pct";
    pub const EMA_FAST: &str = "ema_fast";
    pub const EMA_SLOW: &str = "ema_slow";
    /// (ema_fast - ema_slow) / ema_slow.
    pub const EMA_SPREAD: &str = "ema_spread";
    pub const RSI: &str = "rsi";
    /// Normalized regression slope of close.
    pub const SLOPE: &str = "slope";
    /// Current volume over its rolling mean.
    pub const VOLUME_RATIO: &str = "volume_ratio";
    /// Bar range (high - low) / close, in basis points. Spread proxy.
    pub const RANGE_BP: &str = "range_bp";

    /// Every feature an extractor emits, in canonical order.
    pub const ALL: &[&str] = &[
        CLOSE,
        ATR,
        ATR_PCT,
        EMA_FAST,
        EMA_SLOW,
        EMA_SPREAD,
        RSI,
        SLOPE,
        VOLUME_RATIO,
        RANGE_BP,
    ];
}

/// Named feature map. `BTreeMap` keeps serialization canonical so vectors
/// can participate in hashes and byte-identical artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: BTreeMap<String, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Name of the first non-finite value, if any.
    pub fn first_non_finite(&self) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, &v)| (k.as_str(), v))
    }
}
