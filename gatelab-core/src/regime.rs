//! Market regime classification with persistence hysteresis.
//!
//! Raw classification from normalized slope and volatility percentile; the
//! reported regime only switches after the new classification has persisted
//! for a configured number of consecutive bars. Missing/NaN inputs never
//! cause a transition — the previous regime is reported with a low
//! confidence flag.

use serde::{Deserialize, Serialize};

use crate::config::RegimeConfig;

/// Discrete market-condition classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    Bull,
    Bear,
    Ranging,
    Balanced,
}

/// Normalized slope above which a trend counts as directional.
const TREND_SLOPE_MIN: f64 = 5e-4;
/// Volatility percentile below which a non-trending market reads as ranging.
const RANGING_VOL_MAX: f64 = 0.5;

/// Inputs for one classification step, all as-of the current bar.
#[derive(Debug, Clone, Copy)]
pub struct RegimeInputs {
    /// Normalized regression slope of close (fraction per bar).
    pub slope: f64,
    /// ATR percentile rank in [0, 1).
    pub vol_pct: f64,
}

impl RegimeInputs {
    fn is_valid(&self) -> bool {
        self.slope.is_finite() && self.vol_pct.is_finite()
    }
}

/// Stateless raw classification, before hysteresis.
fn classify_raw(inputs: RegimeInputs) -> Regime {
    if inputs.slope >= TREND_SLOPE_MIN {
        Regime::Bull
    } else if inputs.slope <= -TREND_SLOPE_MIN {
        Regime::Bear
    } else if inputs.vol_pct < RANGING_VOL_MAX {
        Regime::Ranging
    } else {
        Regime::Balanced
    }
}

/// Regime state machine. Created once per replay run, observed every bar,
/// never reset mid-run except through `reset()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeState {
    persistence_bars: usize,
    current: Regime,
    candidate: Option<Regime>,
    streak: usize,
    /// Set when the last observation had missing inputs.
    low_confidence: bool,
}

impl RegimeState {
    pub fn new(config: &RegimeConfig) -> Self {
        Self {
            persistence_bars: config.persistence_bars.max(1),
            // Neutral start: no evidence of trend or volatility yet.
            current: Regime::Ranging,
            candidate: None,
            streak: 0,
            low_confidence: false,
        }
    }

    pub fn current(&self) -> Regime {
        self.current
    }

    pub fn low_confidence(&self) -> bool {
        self.low_confidence
    }

    /// Observe one bar of inputs and return the reported regime.
    pub fn observe(&mut self, inputs: RegimeInputs) -> Regime {
        if !inputs.is_valid() {
            self.low_confidence = true;
            return self.current;
        }
        self.low_confidence = false;

        let raw = classify_raw(inputs);
        if raw == self.current {
            self.candidate = None;
            self.streak = 0;
            return self.current;
        }

        if self.candidate == Some(raw) {
            self.streak += 1;
        } else {
            self.candidate = Some(raw);
            self.streak = 1;
        }

        if self.streak >= self.persistence_bars {
            self.current = raw;
            self.candidate = None;
            self.streak = 0;
        }

        self.current
    }

    /// Explicit state reset (e.g. a data gap the caller treats as a break).
    pub fn reset(&mut self) {
        self.current = Regime::Ranging;
        self.candidate = None;
        self.streak = 0;
        self.low_confidence = false;
    }
}
