//! Property tests: cache key separation, risk map monotonicity, hysteresis.

use proptest::prelude::*;

use gatelab_core::cache::{CacheKey, FeatureCache};
use gatelab_core::config::{RiskMap, RiskMapRow, StrategyConfig};
use gatelab_core::decision::StrategyState;
use gatelab_core::domain::Side;
use gatelab_core::features::FeatureVector;

/// Random single-field perturbations of the default config.
fn perturbed_config(
    cooldown: usize,
    hysteresis: usize,
    payoff_milli: u32,
    tolerance_centi: u32,
) -> StrategyConfig {
    let mut config = StrategyConfig::defaults();
    config.cooldown_bars = cooldown;
    config.hysteresis_bars = hysteresis;
    config.ev.payoff_ratio = payoff_milli as f64 / 1000.0;
    config.fib.htf.tolerance_atr = tolerance_centi as f64 / 100.0;
    config
}

proptest! {
    /// Two configs differing in any perturbed field never produce the same
    /// cache key for the same bar and window.
    #[test]
    fn distinct_configs_never_collide_in_the_cache(
        cooldown_a in 0usize..50, cooldown_b in 0usize..50,
        hysteresis_a in 1usize..10, hysteresis_b in 1usize..10,
        payoff_a in 500u32..3000, payoff_b in 500u32..3000,
        tol_a in 1u32..500, tol_b in 1u32..500,
        bar in 0usize..10_000,
    ) {
        let config_a = perturbed_config(cooldown_a, hysteresis_a, payoff_a, tol_a);
        let config_b = perturbed_config(cooldown_b, hysteresis_b, payoff_b, tol_b);
        prop_assume!(config_a != config_b);

        let window = gatelab_core::domain::WindowHash("same-window".into());
        let key_a = CacheKey {
            bar_index: bar,
            window_hash: window.clone(),
            config_hash: config_a.config_hash(),
        };
        let key_b = CacheKey {
            bar_index: bar,
            window_hash: window,
            config_hash: config_b.config_hash(),
        };
        prop_assert_ne!(key_a, key_b);
    }

    /// An entry stored under one config is invisible under another.
    #[test]
    fn cache_lookup_respects_config_identity(
        cooldown_a in 0usize..50, cooldown_b in 0usize..50,
        bar in 0usize..1000,
    ) {
        prop_assume!(cooldown_a != cooldown_b);
        let config_a = perturbed_config(cooldown_a, 3, 1500, 100);
        let config_b = perturbed_config(cooldown_b, 3, 1500, 100);

        let mut cache = FeatureCache::new(16);
        let window = gatelab_core::domain::WindowHash("w".into());
        cache.put(
            CacheKey {
                bar_index: bar,
                window_hash: window.clone(),
                config_hash: config_a.config_hash(),
            },
            FeatureVector::new(),
        );
        let miss = cache
            .get(&CacheKey {
                bar_index: bar,
                window_hash: window,
                config_hash: config_b.config_hash(),
            })
            .is_none();
        prop_assert!(miss);
    }

    /// Risk-map lookup is monotonic: more confidence never means less size.
    #[test]
    fn risk_map_is_monotonic(
        floors in proptest::collection::vec(0u32..1000, 1..6),
        sizes in proptest::collection::vec(0u32..1000, 1..6),
        conf_a in 0.0f64..1.5, conf_b in 0.0f64..1.5,
    ) {
        // Build a valid (sorted, non-decreasing) map from the raw vectors.
        let mut floors: Vec<u32> = floors;
        floors.sort_unstable();
        floors.dedup();
        let mut sizes: Vec<u32> = sizes.into_iter().take(floors.len()).collect();
        sizes.sort_unstable();
        prop_assume!(sizes.len() == floors.len());

        let map = RiskMap {
            rows: floors
                .iter()
                .zip(sizes.iter())
                .map(|(&f, &s)| RiskMapRow {
                    min_confidence: f as f64 / 1000.0,
                    size: s as f64 / 1000.0,
                })
                .collect(),
        };

        let (low, high) = if conf_a <= conf_b { (conf_a, conf_b) } else { (conf_b, conf_a) };
        prop_assert!(map.size_for(low) <= map.size_for(high));
    }

    /// A candidate side that alternates every bar never builds a streak,
    /// whatever the sequence of bars.
    #[test]
    fn alternating_candidates_never_build_streak(start in 0usize..1000, len in 2usize..200) {
        let config = StrategyConfig::defaults();
        let mut state = StrategyState::new(&config);
        for i in 0..len {
            let side = if i % 2 == 0 { Side::Long } else { Side::Short };
            let streak = state.observe_candidate(side, start + i);
            prop_assert_eq!(streak, 1);
        }
    }

    /// Consecutive same-side candidates build exactly a linear streak.
    #[test]
    fn consecutive_candidates_build_linear_streak(start in 0usize..1000, len in 1usize..200) {
        let config = StrategyConfig::defaults();
        let mut state = StrategyState::new(&config);
        for i in 0..len {
            let streak = state.observe_candidate(Side::Long, start + i);
            prop_assert_eq!(streak, i + 1);
        }
    }
}

#[test]
fn window_hash_distinguishes_content() {
    use chrono::NaiveDate;
    use gatelab_core::domain::{Candle, CandleSeries};

    let base = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let make = |closes: &[f64]| {
        CandleSeries::new(
            "T",
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| Candle {
                    ts: base + chrono::Duration::hours(i as i64),
                    open: c,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c,
                    volume: 1.0,
                })
                .collect(),
        )
        .unwrap()
    };

    let a = make(&[1.0, 2.0, 3.0, 4.0]);
    let b = make(&[1.0, 2.0, 3.0, 5.0]); // last close differs
    assert_ne!(a.window_hash(0, 3), b.window_hash(0, 3));
    // Identical content in the shared prefix still matches.
    assert_eq!(a.window_hash(0, 2), b.window_hash(0, 2));
}
