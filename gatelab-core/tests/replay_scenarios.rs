//! End-to-end replay scenarios exercising the gate pipeline and exits.

use chrono::NaiveDate;
use gatelab_core::config::{MissingPolicy, RegimeValues, StrategyConfig, ThresholdConfig};
use gatelab_core::domain::{
    Candle, CandleSeries, ConstantProvider, ExitReason, ProbabilityPair, SequenceProvider,
};
use gatelab_core::replay::{run_replay, ReplayError, RunParams};

fn base_ts() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Perfectly flat, zero-volatility series: every bar identical.
fn flat_series(n: usize) -> CandleSeries {
    let candles = (0..n)
        .map(|i| Candle {
            ts: base_ts() + chrono::Duration::hours(i as i64),
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            volume: 1000.0,
        })
        .collect();
    CandleSeries::new("FLAT", candles).unwrap()
}

/// Gently varying series so indicators warm up with nonzero ATR.
fn noisy_series(n: usize) -> CandleSeries {
    let candles = (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + (x * 0.7).sin() * 2.0 + x * 0.01;
            let open = close - 0.2;
            Candle {
                ts: base_ts() + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 0.5,
                low: open.min(close) - 0.5,
                close,
                volume: 1000.0 + (i % 7) as f64 * 50.0,
            }
        })
        .collect();
    CandleSeries::new("NOISY", candles).unwrap()
}

/// Config with every gate after the one under test opened wide.
fn permissive_config() -> StrategyConfig {
    let mut config = StrategyConfig::defaults();
    config.thresholds = ThresholdConfig::from_flat(0.55);
    config.hysteresis_bars = 1;
    config.cooldown_bars = 0;
    config.ev.min_edge = 0.0;
    config.confidence.entry_floor = RegimeValues::uniform(0.0);
    config.fib.htf.tolerance_atr = 1_000.0;
    config.fib.ltf.tolerance_atr = 1_000.0;
    config.fib.htf.missing_policy = MissingPolicy::Pass;
    config.fib.ltf.missing_policy = MissingPolicy::Pass;
    config
}

fn strong_long() -> ConstantProvider {
    ConstantProvider {
        pair: ProbabilityPair::new(0.85, 0.05),
    }
}

// ─── Scenario 1: flat series, zero volatility ───────────────────────

#[test]
fn flat_series_produces_zero_trades() {
    let series = flat_series(200);
    // Moderate probabilities: separation 0.4 → confidence 0.4, below the
    // ranging floor of 0.45.
    let provider = ConstantProvider {
        pair: ProbabilityPair::new(0.7, 0.3),
    };
    let mut config = StrategyConfig::defaults();
    config.hysteresis_bars = 1;

    let artifact = run_replay(&series, &config, &provider, None, &RunParams::default()).unwrap();

    assert!(artifact.trades.is_empty());
    assert_eq!(artifact.final_equity, RunParams::default().initial_capital);
    for &eq in &artifact.equity_curve {
        assert_eq!(eq, RunParams::default().initial_capital);
    }
    // The run reaches the confidence gate and stops there — never OK.
    assert!(artifact.diagnostics.reason_counts.get("CONFIDENCE_BLOCK").copied().unwrap_or(0) > 0);
    assert_eq!(artifact.diagnostics.reason_counts.get("OK"), None);
}

// ─── Scenario 2: oscillating signal vs hysteresis ───────────────────

#[test]
fn oscillating_probabilities_with_hysteresis_never_trade() {
    let series = noisy_series(300);
    let provider = SequenceProvider::new(vec![
        ProbabilityPair::new(0.9, 0.1),
        ProbabilityPair::new(0.1, 0.9),
    ]);
    let mut config = permissive_config();
    config.hysteresis_bars = 3;

    let artifact = run_replay(&series, &config, &provider, None, &RunParams::default()).unwrap();

    assert!(artifact.trades.is_empty(), "oscillating signal must never persist 3 bars");
    assert!(artifact.diagnostics.reason_counts.get("HYSTERESIS_BLOCK").copied().unwrap_or(0) > 0);
    assert_eq!(artifact.diagnostics.reason_counts.get("OK"), None);
}

// ─── Scenario 3: HTF unavailable, missing policy ────────────────────

/// HTF lookback too long for the series: resampled history never reaches
/// it, so the HTF context is unavailable on every bar.
fn config_with_unavailable_htf(policy: MissingPolicy) -> StrategyConfig {
    let mut config = permissive_config();
    config.fib.htf_bucket = 4;
    config.fib.htf.swing_lookback = 500;
    config.fib.htf.missing_policy = policy;
    config
}

#[test]
fn htf_unavailable_with_pass_policy_trades() {
    let series = noisy_series(300);
    let config = config_with_unavailable_htf(MissingPolicy::Pass);
    let artifact =
        run_replay(&series, &config, &strong_long(), None, &RunParams::default()).unwrap();
    assert!(!artifact.trades.is_empty(), "pass policy must let entries through");
}

#[test]
fn htf_unavailable_with_block_policy_blocks() {
    let series = noisy_series(300);
    let config = config_with_unavailable_htf(MissingPolicy::Block);
    let artifact =
        run_replay(&series, &config, &strong_long(), None, &RunParams::default()).unwrap();
    assert!(artifact.trades.is_empty());
    assert!(artifact.diagnostics.reason_counts.get("HTF_FIB_BLOCK").copied().unwrap_or(0) > 0);
}

// ─── Scenario 4: intrabar stop/target precedence ────────────────────

#[test]
fn stop_beats_target_inside_one_bar() {
    // Calm series, then one violent bar whose range covers both the stop
    // and the target of any position opened before it.
    let spike_bar = 220;
    let candles: Vec<Candle> = (0..260)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + (x * 0.5).sin() * 1.5;
            let open = close - 0.1;
            let (high, low) = if i == spike_bar {
                (close + 40.0, close - 40.0) // covers every plausible threshold
            } else {
                (open.max(close) + 0.4, open.min(close) - 0.4)
            };
            Candle {
                ts: base_ts() + chrono::Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            }
        })
        .collect();
    let series = CandleSeries::new("SPIKE", candles).unwrap();

    let mut config = permissive_config();
    // Wide exits so only the spike bar can touch them, and no other exit
    // condition can fire first.
    config.exits.stop_loss_atr = Some(8.0);
    config.exits.take_profit_atr = Some(12.0);
    config.exits.max_holding_bars = None;
    config.exits.confidence_exit_floor = None;
    config.exits.exit_on_regime_change = false;
    config.exits.htf_trailing_mult = None;
    config.cooldown_bars = 300; // one trade is enough

    let artifact =
        run_replay(&series, &config, &strong_long(), None, &RunParams::default()).unwrap();

    let spiked: Vec<_> = artifact
        .trades
        .iter()
        .filter(|t| t.exit_bar == spike_bar)
        .collect();
    assert_eq!(spiked.len(), 1, "expected exactly one trade closed by the spike");
    assert_eq!(
        spiked[0].exit_reason,
        ExitReason::StopLoss,
        "when both levels sit inside one bar, the stop wins"
    );
}

// ─── Mode consistency ───────────────────────────────────────────────

#[test]
fn precomputed_mode_without_table_fails_loudly() {
    let series = noisy_series(200);
    let mut config = permissive_config();
    config.mode = gatelab_core::config::FeatureMode::Precomputed;

    let err = run_replay(&series, &config, &strong_long(), None, &RunParams::default())
        .unwrap_err();
    assert!(matches!(err, ReplayError::ModeInconsistency(_)));
}

#[test]
fn recompute_mode_with_bad_table_records_fallback_warning() {
    let series = noisy_series(200);
    let config = permissive_config();
    // Empty table: fails verification, run proceeds on the slow path.
    let table = gatelab_core::features::PrecomputedTable::new(0);

    let artifact = run_replay(
        &series,
        &config,
        &strong_long(),
        Some(&table),
        &RunParams::default(),
    )
    .unwrap();
    let warning = artifact.diagnostics.fallback_warning.expect("fallback must be recorded");
    assert!(warning.contains("recomputing"));
}

// ─── Cooldown across the replay loop ────────────────────────────────

#[test]
fn cooldown_enforced_between_trades() {
    let series = noisy_series(400);
    let mut config = permissive_config();
    config.cooldown_bars = 10;
    // Tight exits so several round trips happen.
    config.exits.stop_loss_atr = Some(1.0);
    config.exits.take_profit_atr = Some(1.5);

    let artifact =
        run_replay(&series, &config, &strong_long(), None, &RunParams::default()).unwrap();

    assert!(artifact.trades.len() >= 2, "need multiple trades to check the gap");
    for pair in artifact.trades.windows(2) {
        let gap = pair[1].entry_bar - pair[0].exit_bar;
        assert!(
            gap > 10,
            "entry at bar {} only {gap} bars after exit at {}",
            pair[1].entry_bar,
            pair[0].exit_bar
        );
    }
}

// ─── Config rejection before any bar ────────────────────────────────

#[test]
fn dual_threshold_config_rejected_before_bar_zero() {
    let series = noisy_series(100);
    let mut config = permissive_config();
    config.thresholds.table = Some(RegimeValues::uniform(
        gatelab_core::config::ZoneValues::uniform(0.6),
    ));
    // flat is already set by permissive_config → both sources present.
    let err = run_replay(&series, &config, &strong_long(), None, &RunParams::default())
        .unwrap_err();
    assert!(matches!(
        err,
        ReplayError::Config(gatelab_core::config::ConfigError::DualThresholdSource)
    ));
}
