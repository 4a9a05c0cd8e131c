//! Trial fan-out integration tests: isolation, determinism, error locality.

use chrono::NaiveDate;
use gatelab_core::config::StrategyConfig;
use gatelab_core::domain::{Candle, CandleSeries, ConstantProvider, ProbabilityPair};
use gatelab_runner::{run_trials, RunConfig};

fn make_series(n: usize) -> CandleSeries {
    let base = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut price = 100.0_f64;
    let candles = (0..n)
        .map(|i| {
            let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
            price = (price + ((seed % 200) as f64 - 100.0) * 0.02).max(10.0);
            let open = price - 0.3;
            let close = price + 0.2;
            Candle {
                ts: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 0.8,
                low: open.min(close) - 0.8,
                close,
                volume: 1000.0 + (seed % 300) as f64,
            }
        })
        .collect();
    CandleSeries::new("TEST", candles).unwrap()
}

fn strategies() -> Vec<StrategyConfig> {
    let mut out = Vec::new();
    for (hysteresis, cooldown) in [(1, 0), (2, 3), (3, 5), (1, 10)] {
        let mut s = StrategyConfig::defaults();
        s.hysteresis_bars = hysteresis;
        s.cooldown_bars = cooldown;
        out.push(s);
    }
    out
}

fn provider() -> ConstantProvider {
    ConstantProvider {
        pair: ProbabilityPair::new(0.8, 0.1),
    }
}

#[test]
fn parallel_trials_are_deterministic() {
    let series = make_series(300);
    let config = RunConfig::single("TEST", StrategyConfig::defaults());
    let strategies = strategies();

    let first = run_trials(&series, &config, &strategies, &provider(), None);
    let second = run_trials(&series, &config, &strategies, &provider(), None);

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        let a = a.as_ref().unwrap();
        let b = b.as_ref().unwrap();
        assert_eq!(a.trial, b.trial);
        assert_eq!(
            a.artifact.to_canonical_json().unwrap(),
            b.artifact.to_canonical_json().unwrap()
        );
    }
}

#[test]
fn results_come_back_in_input_order() {
    let series = make_series(250);
    let config = RunConfig::single("TEST", StrategyConfig::defaults());
    let strategies = strategies();

    let reports = run_trials(&series, &config, &strategies, &provider(), None);
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.as_ref().unwrap().trial, i);
    }
}

#[test]
fn trials_never_share_cache_or_state() {
    // Two different configs over the same series: distinct config hashes,
    // distinct run ids, independently consistent artifacts.
    let series = make_series(300);
    let config = RunConfig::single("TEST", StrategyConfig::defaults());
    let strategies = strategies();

    let reports = run_trials(&series, &config, &strategies, &provider(), None);
    let hashes: Vec<_> = reports
        .iter()
        .map(|r| r.as_ref().unwrap().artifact.metadata.config_hash.clone())
        .collect();
    for (i, a) in hashes.iter().enumerate() {
        for b in &hashes[i + 1..] {
            assert_ne!(a, b, "distinct strategies must have distinct config hashes");
        }
    }
}

#[test]
fn one_bad_config_fails_only_its_own_trial() {
    let series = make_series(200);
    let config = RunConfig::single("TEST", StrategyConfig::defaults());

    let mut strategies = strategies();
    // Poison one config: both threshold sources set.
    strategies[2].thresholds.flat = Some(0.6);

    let reports = run_trials(&series, &config, &strategies, &provider(), None);
    assert!(reports[0].is_ok());
    assert!(reports[1].is_ok());
    assert!(reports[2].is_err());
    assert!(reports[3].is_ok());
}

#[test]
fn sequential_and_parallel_agree() {
    let series = make_series(250);
    let config = RunConfig::single("TEST", StrategyConfig::defaults());
    let strategies = strategies();
    let parallel = run_trials(&series, &config, &strategies, &provider(), None);

    for (i, strategy) in strategies.iter().enumerate() {
        let params = gatelab_core::replay::RunParams {
            initial_capital: config.initial_capital,
            seed: gatelab_core::rng::SeedHierarchy::new(config.seed)
                .sub_seed(&strategy.config_hash(), i as u64),
            build_id: env!("CARGO_PKG_VERSION").to_string(),
        };
        let sequential =
            gatelab_runner::run_trial(&series, strategy, &provider(), None, &params, i).unwrap();
        assert_eq!(
            sequential.artifact.to_canonical_json().unwrap(),
            parallel[i]
                .as_ref()
                .unwrap()
                .artifact
                .to_canonical_json()
                .unwrap()
        );
    }
}
