//! Confidence — a pure function of probabilities and market-quality signals.
//!
//! Monotonic non-decreasing in every quality input at fixed probabilities.
//! Documented bound is [0, 1], but the volume-ratio term is capped at
//! `volume_ratio_cap`, and a cap above 1.0 lets the composite overshoot
//! slightly. That overshoot is preserved behavior (see DESIGN.md), pinned
//! by a test below.

use serde::{Deserialize, Serialize};

use crate::domain::ProbabilityPair;
use crate::features::{names, FeatureVector};

/// Scalar confidence. Nominally in [0, 1]; may exceed 1 under a loose
/// volume-ratio cap.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ConfidenceScore(pub f64);

impl ConfidenceScore {
    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Market-quality inputs, each already oriented so that larger = better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInputs {
    /// 1 - ATR percentile: calm tape scores higher.
    pub atr_quality: f64,
    /// Squashed bar-range (spread proxy): tight bars score higher.
    pub spread_quality: f64,
    /// Current volume over rolling mean, uncapped here.
    pub volume_ratio: f64,
    /// External data-quality signal in [0, 1].
    pub data_quality: f64,
}

/// Range (in basis points) at which spread quality halves.
const SPREAD_HALF_BP: f64 = 50.0;

impl ConfidenceInputs {
    /// Derive quality inputs from an extracted feature vector.
    ///
    /// `data_quality` comes from the caller (e.g. 0.5 when the regime
    /// classifier flagged low confidence, 1.0 otherwise).
    pub fn from_features(features: &FeatureVector, data_quality: f64) -> Self {
        let atr_pct = features.get(names::ATR_PCT).unwrap_or(f64::NAN);
        let range_bp = features.get(names::RANGE_BP).unwrap_or(f64::NAN);
        let volume_ratio = features.get(names::VOLUME_RATIO).unwrap_or(f64::NAN);
        Self {
            atr_quality: 1.0 - atr_pct,
            spread_quality: SPREAD_HALF_BP / (SPREAD_HALF_BP + range_bp.max(0.0)),
            volume_ratio,
            data_quality,
        }
    }
}

/// Compute the confidence score.
///
/// `base` is the directional separation of the probability pair; the
/// averaged quality terms scale it within [0.5x, 1x]; the capped volume
/// ratio multiplies last. NaN anywhere yields NaN (callers gate on missing
/// data before reaching here).
pub fn confidence(
    probabilities: ProbabilityPair,
    inputs: ConfidenceInputs,
    volume_ratio_cap: f64,
) -> ConfidenceScore {
    let base = (probabilities.p_buy - probabilities.p_sell).abs();

    let quality = (inputs.atr_quality.clamp(0.0, 1.0)
        + inputs.spread_quality.clamp(0.0, 1.0)
        + inputs.data_quality.clamp(0.0, 1.0))
        / 3.0;

    // Capped, never negative. A cap above 1.0 is where the documented
    // overshoot beyond 1.0 comes from. `max` would swallow NaN, so it is
    // checked explicitly.
    let volume_term = if inputs.volume_ratio.is_nan() {
        f64::NAN
    } else {
        inputs.volume_ratio.max(0.0).min(volume_ratio_cap)
    };

    ConfidenceScore(base * (0.5 + 0.5 * quality) * volume_term)
}
