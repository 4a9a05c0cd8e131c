//! Indicator precompute kit.
//!
//! Indicators are pure functions: candle history in, numeric series out.
//! They are precomputed once (or recomputed per window on the slow path)
//! and must never read past the index they are reporting for — every
//! indicator passes the truncated-vs-full series test.

pub mod atr;
pub mod ema;
pub mod percentile;
pub mod rsi;
pub mod slope;
pub mod sma;

pub use atr::{true_range, wilder_smooth, Atr};
pub use ema::{ema_of_series, Ema};
pub use percentile::rolling_percentile_rank;
pub use rsi::Rsi;
pub use slope::RegressionSlope;
pub use sma::Sma;

use crate::domain::Candle;

/// Trait for indicators.
///
/// The output series has the same length as the input; the first
/// `lookback()` values are `f64::NAN` (warmup). No value at bar t may
/// depend on data from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Stable series name (e.g. "atr_14"). Used as the key in precomputed tables.
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire candle series.
    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Create synthetic candles from close prices for testing.
///
/// Open = previous close (or close for the first candle),
/// high = max(open, close) + 1.0, low = min(open, close) - 1.0.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    use chrono::NaiveDate;
    let base = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                ts: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
