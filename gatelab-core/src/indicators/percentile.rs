//! Rolling percentile rank.
//!
//! For each index, the fraction of values in the trailing window that are
//! strictly below the current value. Feeds the ATR-zone selection and the
//! regime classifier's volatility input.

/// Percentile rank of `values[i]` within `values[i+1-window ..= i]`.
///
/// Output in [0, 1); NaN while the window is incomplete or when the window
/// contains NaN. The window includes the current value, so a value equal to
/// every other one ranks 0.0 (nothing strictly below it).
pub fn rolling_percentile_rank(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window < 2 || n < window {
        return result;
    }

    for i in (window - 1)..n {
        let slice = &values[(i + 1 - window)..=i];
        let current = values[i];
        if current.is_nan() || slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        let below = slice.iter().filter(|&&v| v < current).count();
        result[i] = below as f64 / window as f64;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;

    #[test]
    fn rank_of_maximum_is_high() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 10.0];
        let result = rolling_percentile_rank(&values, 5);
        // 4 of 5 values strictly below 10.0
        assert_approx(result[4], 0.8, 1e-12);
    }

    #[test]
    fn rank_of_minimum_is_zero() {
        let values = vec![5.0, 4.0, 3.0, 2.0, 1.0];
        let result = rolling_percentile_rank(&values, 5);
        assert_approx(result[4], 0.0, 1e-12);
    }

    #[test]
    fn constant_series_ranks_zero() {
        let values = vec![3.0; 8];
        let result = rolling_percentile_rank(&values, 4);
        for &v in &result[3..] {
            assert_approx(v, 0.0, 1e-12);
        }
    }

    #[test]
    fn warmup_is_nan() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = rolling_percentile_rank(&values, 3);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert!(!result[2].is_nan());
    }

    #[test]
    fn nan_in_window_yields_nan() {
        let values = vec![1.0, f64::NAN, 3.0, 4.0, 5.0];
        let result = rolling_percentile_rank(&values, 3);
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
        assert!(!result[4].is_nan());
    }
}
