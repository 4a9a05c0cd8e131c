//! Feature extractor — fast (precomputed) and slow (recompute) paths.
//!
//! Both paths are as-of: the vector for bar `i` uses only candles at
//! indices <= `i`. Indicators are causal, so the slow path's
//! prefix-recompute and the fast path's full-series precompute agree at
//! every index; `FAST_SLOW_TOLERANCE` bounds the accepted drift.

use thiserror::Error;

use super::precomputed::{PrecomputedTable, TableError};
use super::{names, FeatureVector};
use crate::config::StrategyConfig;
use crate::domain::Candle;
use crate::indicators::{rolling_percentile_rank, Atr, Ema, Indicator, RegressionSlope, Rsi};

/// Accepted numeric drift between the fast and slow paths.
pub const FAST_SLOW_TOLERANCE: f64 = 1e-9;

/// Errors from feature extraction for a single bar.
#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    /// A required input is absent or NaN — the fail-safe path, not a fault.
    #[error("missing data at bar {bar}: {field}")]
    MissingData { bar: usize, field: String },
    /// An internal computation fault. Counted against the error-rate ceiling.
    #[error("feature computation failed at bar {bar}: {detail}")]
    Computation { bar: usize, detail: String },
}

/// Which path the extractor reads.
#[derive(Debug, Clone, Copy)]
pub enum FeatureSource<'a> {
    /// Verified, index-aligned precomputed arrays.
    Precomputed(&'a PrecomputedTable),
    /// Recompute from the candle prefix.
    Window,
}

/// As-of feature extraction with two numerically equivalent paths.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    atr_period: usize,
    ema_fast: usize,
    ema_slow: usize,
    rsi_period: usize,
    volume_window: usize,
    slope_window: usize,
    percentile_window: usize,
}

impl FeatureExtractor {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            atr_period: config.features.atr_period,
            ema_fast: config.features.ema_fast,
            ema_slow: config.features.ema_slow,
            rsi_period: config.features.rsi_period,
            volume_window: config.features.volume_window,
            slope_window: config.regime.trend_window,
            percentile_window: config.atr_zones.percentile_window,
        }
    }

    /// Series names a precomputed table must carry for the fast path.
    pub fn required_series(&self) -> Vec<String> {
        vec![
            format!("atr_{}", self.atr_period),
            format!("atr_pct_{}", self.percentile_window),
            format!("ema_{}", self.ema_fast),
            format!("ema_{}", self.ema_slow),
            format!("rsi_{}", self.rsi_period),
            format!("slope_{}", self.slope_window),
        ]
    }

    /// Verify a table is usable as the fast path for `series_len` bars.
    pub fn verify_table(
        &self,
        table: &PrecomputedTable,
        series_len: usize,
    ) -> Result<(), TableError> {
        table.verify(&self.required_series(), series_len)
    }

    /// Precompute all required series over the full candle series.
    ///
    /// This is how a caller builds the fast-path table; offset 0 means the
    /// arrays align with global index 0.
    pub fn build_table(&self, candles: &[Candle]) -> PrecomputedTable {
        let mut table = PrecomputedTable::new(0);
        let atr = Atr::new(self.atr_period).compute(candles);
        table.insert(
            format!("atr_pct_{}", self.percentile_window),
            rolling_percentile_rank(&atr, self.percentile_window),
        );
        table.insert(format!("atr_{}", self.atr_period), atr);
        table.insert(
            format!("ema_{}", self.ema_fast),
            Ema::new(self.ema_fast).compute(candles),
        );
        table.insert(
            format!("ema_{}", self.ema_slow),
            Ema::new(self.ema_slow).compute(candles),
        );
        table.insert(
            format!("rsi_{}", self.rsi_period),
            Rsi::new(self.rsi_period).compute(candles),
        );
        table.insert(
            format!("slope_{}", self.slope_window),
            RegressionSlope::new(self.slope_window).compute(candles),
        );
        table
    }

    /// Extract the feature vector for bar `bar` (global index).
    ///
    /// Every value in the returned vector is finite; a NaN anywhere maps to
    /// `FeatureError::MissingData` naming the field.
    pub fn extract(
        &self,
        candles: &[Candle],
        bar: usize,
        source: FeatureSource<'_>,
    ) -> Result<FeatureVector, FeatureError> {
        if bar >= candles.len() {
            return Err(FeatureError::Computation {
                bar,
                detail: format!("bar index out of range (len {})", candles.len()),
            });
        }

        let (atr, atr_pct, ema_fast, ema_slow, rsi, slope) = match source {
            FeatureSource::Precomputed(table) => {
                let read = |name: String| table.get(&name, bar).unwrap_or(f64::NAN);
                (
                    read(format!("atr_{}", self.atr_period)),
                    read(format!("atr_pct_{}", self.percentile_window)),
                    read(format!("ema_{}", self.ema_fast)),
                    read(format!("ema_{}", self.ema_slow)),
                    read(format!("rsi_{}", self.rsi_period)),
                    read(format!("slope_{}", self.slope_window)),
                )
            }
            FeatureSource::Window => {
                let prefix = &candles[..=bar];
                let atr_series = Atr::new(self.atr_period).compute(prefix);
                let atr_pct = *rolling_percentile_rank(&atr_series, self.percentile_window)
                    .last()
                    .unwrap_or(&f64::NAN);
                let last = |v: Vec<f64>| *v.last().unwrap_or(&f64::NAN);
                (
                    *atr_series.last().unwrap_or(&f64::NAN),
                    atr_pct,
                    last(Ema::new(self.ema_fast).compute(prefix)),
                    last(Ema::new(self.ema_slow).compute(prefix)),
                    last(Rsi::new(self.rsi_period).compute(prefix)),
                    last(RegressionSlope::new(self.slope_window).compute(prefix)),
                )
            }
        };

        let candle = &candles[bar];
        let ema_spread = if ema_slow != 0.0 {
            (ema_fast - ema_slow) / ema_slow
        } else {
            f64::NAN
        };
        let volume_ratio = self.volume_ratio(candles, bar);
        let range_bp = if candle.close > 0.0 {
            (candle.high - candle.low) / candle.close * 10_000.0
        } else {
            f64::NAN
        };

        let mut fv = FeatureVector::new();
        fv.insert(names::CLOSE, candle.close);
        fv.insert(names::ATR, atr);
        fv.insert(names::ATR_PCT, atr_pct);
        fv.insert(names::EMA_FAST, ema_fast);
        fv.insert(names::EMA_SLOW, ema_slow);
        fv.insert(names::EMA_SPREAD, ema_spread);
        fv.insert(names::RSI, rsi);
        fv.insert(names::SLOPE, slope);
        fv.insert(names::VOLUME_RATIO, volume_ratio);
        fv.insert(names::RANGE_BP, range_bp);

        if let Some(field) = fv.first_non_finite() {
            return Err(FeatureError::MissingData {
                bar,
                field: field.to_string(),
            });
        }

        Ok(fv)
    }

    /// Current volume over the rolling mean volume. Identical on both paths
    /// (computed directly from candles).
    fn volume_ratio(&self, candles: &[Candle], bar: usize) -> f64 {
        if bar + 1 < self.volume_window {
            return f64::NAN;
        }
        let window = &candles[(bar + 1 - self.volume_window)..=bar];
        let sum: f64 = window.iter().map(|c| c.volume).sum();
        if sum.is_nan() || sum <= 0.0 {
            return f64::NAN;
        }
        let mean = sum / self.volume_window as f64;
        candles[bar].volume / mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(&StrategyConfig::defaults())
    }

    /// Enough candles to clear every warmup window in the default config.
    fn long_series() -> Vec<Candle> {
        let closes: Vec<f64> = (0..160)
            .map(|i| {
                let i = i as f64;
                100.0 + (i * 0.7).sin() * 5.0 + i * 0.05
            })
            .collect();
        make_candles(&closes)
    }

    #[test]
    fn warmup_bar_reports_missing_data() {
        let candles = long_series();
        let err = extractor()
            .extract(&candles, 3, FeatureSource::Window)
            .unwrap_err();
        assert!(matches!(err, FeatureError::MissingData { bar: 3, .. }));
    }

    #[test]
    fn warm_bar_has_all_features_finite() {
        let candles = long_series();
        let fv = extractor()
            .extract(&candles, 150, FeatureSource::Window)
            .unwrap();
        assert_eq!(fv.len(), names::ALL.len());
        assert_eq!(fv.first_non_finite(), None);
    }

    #[test]
    fn fast_and_slow_paths_agree() {
        let candles = long_series();
        let ex = extractor();
        let table = ex.build_table(&candles);
        ex.verify_table(&table, candles.len()).unwrap();

        for bar in [130, 140, 155] {
            let fast = ex
                .extract(&candles, bar, FeatureSource::Precomputed(&table))
                .unwrap();
            let slow = ex.extract(&candles, bar, FeatureSource::Window).unwrap();
            for (name, fast_v) in fast.iter() {
                let slow_v = slow.get(name).unwrap();
                assert!(
                    (fast_v - slow_v).abs() <= FAST_SLOW_TOLERANCE,
                    "{name} diverged at bar {bar}: fast={fast_v}, slow={slow_v}"
                );
            }
        }
    }

    #[test]
    fn out_of_range_bar_is_computation_error() {
        let candles = long_series();
        let err = extractor()
            .extract(&candles, 9999, FeatureSource::Window)
            .unwrap_err();
        assert!(matches!(err, FeatureError::Computation { .. }));
    }

    #[test]
    fn extraction_is_as_of() {
        // Truncating future candles must not change the vector at bar i.
        let candles = long_series();
        let ex = extractor();
        let bar = 140;
        let full = ex.extract(&candles, bar, FeatureSource::Window).unwrap();
        let truncated = ex
            .extract(&candles[..=bar], bar, FeatureSource::Window)
            .unwrap();
        assert_eq!(full, truncated);
    }
}
