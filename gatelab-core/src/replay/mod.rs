//! Replay engine — deterministic bar-by-bar evaluation of the full pipeline.
//!
//! One run is single-threaded and strictly sequential: features → regime →
//! Fibonacci context → decision → entry fill → exit evaluation → records,
//! once per bar in timestamp order. Mode consistency is verified before
//! bar 0; per-bar computation errors are counted and the run aborts once
//! the configured error-rate ceiling is crossed — errors are never
//! swallowed, because a parameter search comparing many configurations
//! would otherwise favor the ones that error (and skip losing bars) most.

pub mod artifact;
pub mod exits;

pub use artifact::{BacktestArtifact, ReplayDiagnostics, RunMetadata, SCHEMA_VERSION};
pub use exits::{ExitCheck, ExitEvaluator};

use std::collections::BTreeMap;

use thiserror::Error;

use crate::cache::{CacheKey, FeatureCache};
use crate::confidence::{confidence, ConfidenceInputs};
use crate::config::{ConfigError, FeatureMode, StrategyConfig};
use crate::decision::{Action, DecisionContext, DecisionEngine, Reason, StrategyState};
use crate::domain::{CandleSeries, ExitReason, Position, ProbabilityProvider, Side, TradeRecord};
use crate::features::{names, FeatureError, FeatureExtractor, FeatureSource, PrecomputedTable};
use crate::fib::FibContextProvider;
use crate::regime::{RegimeInputs, RegimeState};

/// Caller-supplied run parameters (everything else lives in the config).
#[derive(Debug, Clone)]
pub struct RunParams {
    pub initial_capital: f64,
    /// Recorded in run metadata; the decision path itself is deterministic.
    pub seed: u64,
    /// Build identifier for reproducibility records.
    pub build_id: String,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            seed: 0,
            build_id: "dev".into(),
        }
    }
}

/// Errors that abort a replay run.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid run parameters: {0}")]
    InvalidParams(String),
    /// Declared fast mode without usable backing data. Never degraded
    /// silently: runs being compared must all take the same path.
    #[error("mode inconsistency: {0}")]
    ModeInconsistency(String),
    #[error(
        "error rate exceeded at bar {bar}: {errors} errors in {bars} bars (ceiling {ceiling})"
    )]
    ErrorRateExceeded {
        bar: usize,
        errors: usize,
        bars: usize,
        ceiling: f64,
    },
}

/// An entry decided at one bar, filled at the next bar's open.
#[derive(Debug, Clone)]
struct PendingEntry {
    side: Side,
    risk_fraction: f64,
    /// ATR at decision time; freezes the exit thresholds.
    atr: f64,
    regime: crate::regime::Regime,
}

/// Run one replay over a validated candle series.
///
/// This is the only entry point; an external search process calls it many
/// times concurrently, each call with its own state and cache.
pub fn run_replay(
    series: &CandleSeries,
    config: &StrategyConfig,
    provider: &dyn ProbabilityProvider,
    table: Option<&PrecomputedTable>,
    params: &RunParams,
) -> Result<BacktestArtifact, ReplayError> {
    config.validate()?;
    if !(params.initial_capital.is_finite() && params.initial_capital > 0.0) {
        return Err(ReplayError::InvalidParams(format!(
            "initial_capital must be positive, got {}",
            params.initial_capital
        )));
    }

    let candles = series.candles();
    let n = candles.len();
    let extractor = FeatureExtractor::new(config);
    let config_hash = config.config_hash();

    // Mode consistency, checked before any bar is processed.
    let (source_is_fast, fallback_warning) = match (config.mode, table) {
        (FeatureMode::Precomputed, Some(t)) => {
            extractor
                .verify_table(t, n)
                .map_err(|e| ReplayError::ModeInconsistency(e.to_string()))?;
            (true, None)
        }
        (FeatureMode::Precomputed, None) => {
            return Err(ReplayError::ModeInconsistency(
                "precomputed mode declared but no indicator table supplied".into(),
            ));
        }
        (FeatureMode::Recompute, Some(t)) => match extractor.verify_table(t, n) {
            Ok(()) => (true, None),
            Err(e) => (
                false,
                Some(format!(
                    "precomputed table rejected ({e}); recomputing from candle windows"
                )),
            ),
        },
        (FeatureMode::Recompute, None) => (false, None),
    };

    let engine = DecisionEngine::new(config);
    let mut strategy_state = StrategyState::new(config);
    let mut regime_state = RegimeState::new(&config.regime);
    let mut cache = FeatureCache::new(config.cache_capacity);
    let fib_htf = FibContextProvider::new(&config.fib.htf);
    let fib_ltf = FibContextProvider::new(&config.fib.ltf);
    let exit_eval = ExitEvaluator::new(config.exits);

    // Window span for cache keys: the longest lookback any feature reads.
    let hash_span = (config.features.atr_period + config.atr_zones.percentile_window)
        .max(config.features.ema_slow)
        .max(config.features.rsi_period + 1)
        .max(config.regime.trend_window)
        .max(config.features.volume_window);

    let mut cash = params.initial_capital;
    let mut position: Option<Position> = None;
    let mut pending_entry: Option<PendingEntry> = None;
    let mut equity_curve = Vec::with_capacity(n);
    let mut trades: Vec<TradeRecord> = Vec::new();
    let mut reason_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut missing_data_fields: BTreeMap<String, usize> = BTreeMap::new();
    let mut error_count = 0usize;
    let mut missing_data_bars = 0usize;
    let mut last_valid_close = f64::NAN;

    for t in 0..n {
        let candle = &candles[t];

        // ─── Fill the pending entry at this bar's open ───
        if position.is_none() {
            if let Some(pending) = pending_entry.take() {
                if candle.open.is_finite() && candle.open > 0.0 {
                    let quantity = pending.risk_fraction * cash / candle.open;
                    let thresholds =
                        exit_eval.thresholds_at_entry(pending.side, candle.open, pending.atr);
                    position = Some(Position::open(
                        pending.side,
                        t,
                        candle.ts,
                        candle.open,
                        quantity,
                        thresholds,
                        pending.regime,
                    ));
                    strategy_state.record_entry(pending.side, t);
                } else {
                    // Void open: hold the intent until a tradeable bar.
                    pending_entry = Some(pending);
                }
            }
        }

        // ─── Extract features (memoized) ───
        let key = CacheKey {
            bar_index: t,
            window_hash: series.window_hash(t.saturating_sub(hash_span.saturating_sub(1)), t),
            config_hash: config_hash.clone(),
        };
        let source = if source_is_fast {
            FeatureSource::Precomputed(table.expect("fast source implies table"))
        } else {
            FeatureSource::Window
        };
        let mut bar_missing_data = false;
        let features = match cache.get(&key) {
            Some(fv) => Some(fv),
            None => match extractor.extract(candles, t, source) {
                Ok(fv) => {
                    cache.put(key, fv.clone());
                    Some(fv)
                }
                Err(FeatureError::MissingData { field, .. }) => {
                    missing_data_bars += 1;
                    *missing_data_fields.entry(field).or_default() += 1;
                    bar_missing_data = true;
                    None
                }
                Err(FeatureError::Computation { .. }) => {
                    error_count += 1;
                    let rate = error_count as f64 / (t + 1) as f64;
                    if rate > config.error_rate_ceiling {
                        return Err(ReplayError::ErrorRateExceeded {
                            bar: t,
                            errors: error_count,
                            bars: t + 1,
                            ceiling: config.error_rate_ceiling,
                        });
                    }
                    None
                }
            },
        };

        // ─── Regime (holds previous value on missing inputs) ───
        let (slope, atr_pct, atr) = match &features {
            Some(fv) => (
                fv.get(names::SLOPE).unwrap_or(f64::NAN),
                fv.get(names::ATR_PCT).unwrap_or(f64::NAN),
                fv.get(names::ATR).unwrap_or(f64::NAN),
            ),
            None => (f64::NAN, f64::NAN, f64::NAN),
        };
        let regime = regime_state.observe(RegimeInputs {
            slope,
            vol_pct: atr_pct,
        });

        // ─── Fibonacci contexts (unavailable when ATR is invalid) ───
        let htf = fib_htf.compute_resampled(candles, t, config.fib.htf_bucket, atr);
        let ltf = fib_ltf.compute(candles, t, atr);

        // ─── Decision ───
        let mut confidence_value = None;
        if let Some(fv) = &features {
            let probabilities = provider.probabilities(fv);
            let data_quality = if regime_state.low_confidence() { 0.5 } else { 1.0 };
            let score = confidence(
                probabilities,
                ConfidenceInputs::from_features(fv, data_quality),
                config.confidence.volume_ratio_cap,
            );
            if score.value().is_finite() {
                confidence_value = Some(score.value());
            }

            let ctx = DecisionContext {
                bar: t,
                features: fv,
                probabilities,
                confidence: score,
                regime,
                htf: &htf,
                ltf: &ltf,
            };
            let decision = engine.decide(&ctx, &mut strategy_state);
            *reason_counts
                .entry(decision.reason.as_wire_str().to_string())
                .or_default() += 1;

            if position.is_none()
                && pending_entry.is_none()
                && decision.action != Action::None
                && decision.size > 0.0
            {
                let side = match decision.action {
                    Action::Long => Side::Long,
                    Action::Short => Side::Short,
                    Action::None => unreachable!("checked above"),
                };
                pending_entry = Some(PendingEntry {
                    side,
                    risk_fraction: decision.size,
                    atr,
                    regime,
                });
            }
        } else if bar_missing_data {
            // Fail-safe bar: the decision is none/MISSING_DATA by contract.
            *reason_counts
                .entry(Reason::MissingData.as_wire_str().to_string())
                .or_default() += 1;
        }

        // ─── Exit evaluation ───
        if let Some(pos) = position.as_mut() {
            let check = ExitCheck {
                candle,
                bar: t,
                confidence: confidence_value,
                regime,
                htf: &htf,
                atr,
            };
            if let Some((reason, fill)) = exit_eval.evaluate(pos, &check) {
                let trade = close_position(pos, t, candle.ts, fill, reason, config);
                cash += trade.net_pnl;
                trades.push(trade);
                strategy_state.record_exit(t);
                position = None;
            } else if !candle.is_void() {
                pos.on_bar(candle.high, candle.low);
            }
        }

        // ─── Equity accounting ───
        if !candle.close.is_nan() {
            last_valid_close = candle.close;
        }
        let mark = if candle.close.is_nan() {
            last_valid_close
        } else {
            candle.close
        };
        let equity = match &position {
            Some(pos) if mark.is_finite() => cash + pos.unrealized_pnl(mark),
            _ => cash,
        };
        equity_curve.push(equity);
    }

    // Force-close anything still open at the end of data.
    if let Some(pos) = position.as_mut() {
        if last_valid_close.is_finite() {
            let last = n - 1;
            let trade = close_position(
                pos,
                last,
                candles[last].ts,
                last_valid_close,
                ExitReason::EndOfData,
                config,
            );
            cash += trade.net_pnl;
            trades.push(trade);
        }
    }

    let final_equity = cash;
    let metadata = RunMetadata::new(
        config.mode,
        config_hash,
        series.dataset_hash(),
        params.seed,
        params.build_id.clone(),
    );

    Ok(BacktestArtifact {
        metadata,
        equity_curve,
        trades,
        final_equity,
        diagnostics: ReplayDiagnostics {
            bars_processed: n,
            error_count,
            missing_data_bars,
            missing_data_fields,
            fallback_warning,
            reason_counts,
            cache_hits: cache.hits(),
            cache_misses: cache.misses(),
        },
    })
}

/// Close a position into a trade record. Commission is the round-trip rate
/// applied to the average of entry and exit notional.
fn close_position(
    position: &Position,
    exit_bar: usize,
    exit_ts: chrono::NaiveDateTime,
    exit_price: f64,
    exit_reason: ExitReason,
    config: &StrategyConfig,
) -> TradeRecord {
    let gross_pnl = position.unrealized_pnl(exit_price);
    let commission =
        config.exits.commission_pct * position.size * (position.entry_price + exit_price) / 2.0;
    TradeRecord {
        side: position.side,
        entry_bar: position.entry_bar,
        entry_ts: position.entry_ts,
        entry_price: position.entry_price,
        exit_bar,
        exit_ts,
        exit_price,
        exit_reason,
        size: position.size,
        gross_pnl,
        commission,
        net_pnl: gross_pnl - commission,
        bars_held: position.bars_held,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExitThresholds;
    use crate::regime::Regime;
    use chrono::NaiveDate;

    #[test]
    fn close_position_pnl_and_commission() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let thresholds = ExitThresholds {
            stop_loss: None,
            take_profit: None,
            max_holding_bars: None,
            confidence_exit_floor: None,
            exit_on_regime_change: false,
            htf_trailing_mult: None,
        };
        let mut pos = Position::open(Side::Long, 3, ts, 100.0, 2.0, thresholds, Regime::Bull);
        pos.bars_held = 4;

        let mut config = StrategyConfig::defaults();
        config.exits.commission_pct = 0.001;

        let trade = close_position(&pos, 7, ts, 110.0, ExitReason::TakeProfit, &config);
        assert_eq!(trade.gross_pnl, 20.0); // (110 - 100) * 2
        // 0.001 * 2 * (100 + 110) / 2 = 0.21
        assert!((trade.commission - 0.21).abs() < 1e-12);
        assert!((trade.net_pnl - 19.79).abs() < 1e-12);
        assert_eq!(trade.bars_held, 4);
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    }
}
