//! Linear-regression slope of close prices over a rolling window.
//!
//! Slope is normalized by the window's mean close, so the output reads as
//! fractional price change per bar and is comparable across price levels.
//! Lookback: window - 1.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct RegressionSlope {
    window: usize,
    name: String,
}

impl RegressionSlope {
    pub fn new(window: usize) -> Self {
        assert!(window >= 2, "slope window must be >= 2");
        Self {
            window,
            name: format!("slope_{window}"),
        }
    }
}

/// OLS slope of `data` against bar offsets 0..n, divided by mean(data).
/// Returns NaN on NaN input or a zero/negative mean.
pub fn normalized_slope(data: &[f64]) -> f64 {
    let n = data.len() as f64;
    if data.len() < 2 || data.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let x_mean = (n - 1.0) / 2.0;
    let y_mean: f64 = data.iter().sum::<f64>() / n;
    if y_mean <= 0.0 {
        return f64::NAN;
    }
    let (mut num, mut den) = (0.0, 0.0);
    for (i, &y) in data.iter().enumerate() {
        num += (i as f64 - x_mean) * (y - y_mean);
        den += (i as f64 - x_mean).powi(2);
    }
    if den == 0.0 {
        return 0.0;
    }
    (num / den) / y_mean
}

impl Indicator for RegressionSlope {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window - 1
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let n = candles.len();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let mut result = vec![f64::NAN; n];
        if n < self.window {
            return result;
        }
        for i in (self.window - 1)..n {
            result[i] = normalized_slope(&closes[(i + 1 - self.window)..=i]);
        }
        result
    }
}
