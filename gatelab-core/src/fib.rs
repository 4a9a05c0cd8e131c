//! Fibonacci retracement context — swing detection, level prices, proximity.
//!
//! One parameterized implementation serves both timeframes: the replay
//! instantiates it once for the native (lower) timeframe and once over
//! resampled higher-timeframe candles. Any internal failure (insufficient
//! history, degenerate range, invalid ATR) reports `available = false`
//! explicitly — downstream gates treat that as inconclusive and apply the
//! configured missing policy, never a permissive default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::FibGateConfig;
use crate::domain::Candle;

/// Retracement level. The closed enum is the one canonical key
/// representation — consumers never see string or raw-float keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FibLevel {
    R236,
    R382,
    R500,
    R618,
    R786,
}

impl FibLevel {
    pub const ALL: [FibLevel; 5] = [
        FibLevel::R236,
        FibLevel::R382,
        FibLevel::R500,
        FibLevel::R618,
        FibLevel::R786,
    ];

    pub fn ratio(&self) -> f64 {
        match self {
            FibLevel::R236 => 0.236,
            FibLevel::R382 => 0.382,
            FibLevel::R500 => 0.500,
            FibLevel::R618 => 0.618,
            FibLevel::R786 => 0.786,
        }
    }
}

/// Retracement context as-of one bar. Recomputed per bar; never carries
/// information from future bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibContext {
    pub available: bool,
    pub swing_high: f64,
    pub swing_low: f64,
    /// Indices into the series the context was computed on (the resampled
    /// series for the higher timeframe).
    pub swing_high_idx: usize,
    pub swing_low_idx: usize,
    /// Price of each retracement level, measured down from the swing high.
    pub levels: BTreeMap<FibLevel, f64>,
    /// ATR-normalized distance from the reference close to the nearest level.
    pub proximity_atr: f64,
    pub nearest_level: Option<FibLevel>,
}

impl FibContext {
    /// The explicit not-available context. All numeric fields are NaN so an
    /// accidental read fails loudly in arithmetic rather than passing a gate.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            swing_high: f64::NAN,
            swing_low: f64::NAN,
            swing_high_idx: 0,
            swing_low_idx: 0,
            levels: BTreeMap::new(),
            proximity_atr: f64::NAN,
            nearest_level: None,
        }
    }

    /// Price of a level, keyed canonically.
    pub fn level_price(&self, level: FibLevel) -> Option<f64> {
        self.levels.get(&level).copied()
    }
}

/// Swing/retracement provider, parameterized per timeframe.
#[derive(Debug, Clone)]
pub struct FibContextProvider {
    swing_lookback: usize,
}

impl FibContextProvider {
    pub fn new(config: &FibGateConfig) -> Self {
        Self {
            swing_lookback: config.swing_lookback,
        }
    }

    /// Context from the native series at `bar`, normalizing proximity by `atr`.
    pub fn compute(&self, candles: &[Candle], bar: usize, atr: f64) -> FibContext {
        if bar >= candles.len() || bar + 1 < self.swing_lookback {
            return FibContext::unavailable();
        }
        let start = bar + 1 - self.swing_lookback;
        self.compute_window(&candles[start..=bar], start, candles[bar].close, atr)
    }

    /// Context from resampled higher-timeframe candles.
    ///
    /// Only fully closed buckets as-of `bar` enter the resample, so the
    /// higher-timeframe view can never peek into the current partial bucket.
    pub fn compute_resampled(
        &self,
        candles: &[Candle],
        bar: usize,
        bucket: usize,
        atr: f64,
    ) -> FibContext {
        let reference_close = match candles.get(bar) {
            Some(c) => c.close,
            None => return FibContext::unavailable(),
        };
        let resampled = resample_closed(candles, bar, bucket);
        if resampled.len() < self.swing_lookback {
            return FibContext::unavailable();
        }
        let start = resampled.len() - self.swing_lookback;
        self.compute_window(&resampled[start..], start, reference_close, atr)
    }

    /// Shared core: swing extremes, level prices, proximity.
    fn compute_window(
        &self,
        window: &[Candle],
        window_start: usize,
        reference_close: f64,
        atr: f64,
    ) -> FibContext {
        if !atr.is_finite() || atr <= 0.0 || !reference_close.is_finite() {
            return FibContext::unavailable();
        }

        let mut swing_high = f64::NEG_INFINITY;
        let mut swing_low = f64::INFINITY;
        let mut high_idx = 0;
        let mut low_idx = 0;
        for (i, c) in window.iter().enumerate() {
            if c.high.is_nan() || c.low.is_nan() {
                return FibContext::unavailable();
            }
            if c.high > swing_high {
                swing_high = c.high;
                high_idx = window_start + i;
            }
            if c.low < swing_low {
                swing_low = c.low;
                low_idx = window_start + i;
            }
        }

        let range = swing_high - swing_low;
        if !range.is_finite() || range <= 0.0 {
            // Degenerate range (flat window): no retracement structure.
            return FibContext::unavailable();
        }

        let mut levels = BTreeMap::new();
        for level in FibLevel::ALL {
            levels.insert(level, swing_high - level.ratio() * range);
        }

        let mut nearest = None;
        let mut best = f64::INFINITY;
        for (&level, &price) in &levels {
            let dist = (reference_close - price).abs() / atr;
            if dist < best {
                best = dist;
                nearest = Some(level);
            }
        }

        FibContext {
            available: true,
            swing_high,
            swing_low,
            swing_high_idx: high_idx,
            swing_low_idx: low_idx,
            levels,
            proximity_atr: best,
            nearest_level: nearest,
        }
    }
}

/// Aggregate candles into closed higher-timeframe buckets as-of `bar`.
///
/// Bucket k covers native indices [k*bucket, (k+1)*bucket); only buckets
/// whose last index is <= `bar` are emitted.
pub fn resample_closed(candles: &[Candle], bar: usize, bucket: usize) -> Vec<Candle> {
    if bucket == 0 {
        return Vec::new();
    }
    let complete = (bar + 1).min(candles.len()) / bucket;
    let mut out = Vec::with_capacity(complete);
    for k in 0..complete {
        let chunk = &candles[k * bucket..(k + 1) * bucket];
        let mut high = f64::NEG_INFINITY;
        let mut low = f64::INFINITY;
        let mut volume = 0.0;
        for c in chunk {
            high = high.max(c.high);
            low = low.min(c.low);
            volume += c.volume;
        }
        out.push(Candle {
            ts: chunk[0].ts,
            open: chunk[0].open,
            high,
            low,
            close: chunk[chunk.len() - 1].close,
            volume,
        });
    }
    out
}
