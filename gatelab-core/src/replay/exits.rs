//! Exit evaluation — fixed order, first satisfied condition wins.
//!
//! Order: stop-loss, take-profit, max-holding-bars, confidence-drop,
//! regime-change, HTF-trailing. Checking the stop before the target is the
//! intrabar precedence rule: when both levels fall inside one bar's range
//! the adverse fill is assumed (see DESIGN.md). HTF levels are read only
//! through the `FibLevel` enum, the single canonical key representation.

use crate::config::ExitConfig;
use crate::domain::{Candle, ExitReason, ExitThresholds, Position, Side};
use crate::fib::FibContext;
use crate::regime::Regime;

/// Per-bar inputs to exit evaluation.
#[derive(Debug, Clone, Copy)]
pub struct ExitCheck<'a> {
    pub candle: &'a Candle,
    pub bar: usize,
    /// Confidence for this bar, if it could be computed.
    pub confidence: Option<f64>,
    pub regime: Regime,
    pub htf: &'a FibContext,
    pub atr: f64,
}

/// Evaluates exit conditions for open positions.
#[derive(Debug, Clone)]
pub struct ExitEvaluator {
    config: ExitConfig,
}

impl ExitEvaluator {
    pub fn new(config: ExitConfig) -> Self {
        Self { config }
    }

    /// Freeze exit thresholds for a position entered at `entry_price` with
    /// the ATR observed at decision time. ATR-relative config becomes
    /// absolute prices here and never moves again.
    pub fn thresholds_at_entry(&self, side: Side, entry_price: f64, atr: f64) -> ExitThresholds {
        let sign = side.sign();
        ExitThresholds {
            stop_loss: self
                .config
                .stop_loss_atr
                .map(|m| entry_price - sign * m * atr),
            take_profit: self
                .config
                .take_profit_atr
                .map(|m| entry_price + sign * m * atr),
            max_holding_bars: self.config.max_holding_bars,
            confidence_exit_floor: self.config.confidence_exit_floor,
            exit_on_regime_change: self.config.exit_on_regime_change,
            htf_trailing_mult: self.config.htf_trailing_mult,
        }
    }

    /// First satisfied condition wins. Returns the reason and fill price.
    pub fn evaluate(&self, position: &Position, check: &ExitCheck<'_>) -> Option<(ExitReason, f64)> {
        let candle = check.candle;
        if candle.is_void() {
            return None;
        }

        // 1. Stop-loss: triggered by the bar's range; a gap through the
        // stop fills at the open.
        if let Some(stop) = position.thresholds.stop_loss {
            let (hit, fill) = match position.side {
                Side::Long => (candle.low <= stop, stop.min(candle.open)),
                Side::Short => (candle.high >= stop, stop.max(candle.open)),
            };
            if hit {
                return Some((ExitReason::StopLoss, fill));
            }
        }

        // 2. Take-profit: a favorable gap fills at the open.
        if let Some(target) = position.thresholds.take_profit {
            let (hit, fill) = match position.side {
                Side::Long => (candle.high >= target, target.max(candle.open)),
                Side::Short => (candle.low <= target, target.min(candle.open)),
            };
            if hit {
                return Some((ExitReason::TakeProfit, fill));
            }
        }

        // 3. Max holding period: exits at the close of the expiring bar.
        if let Some(max_bars) = position.thresholds.max_holding_bars {
            if position.bars_held >= max_bars {
                return Some((ExitReason::MaxHold, candle.close));
            }
        }

        // 4. Confidence drop. Skipped when confidence could not be
        // computed this bar — absence of evidence is not a drop.
        if let (Some(floor), Some(confidence)) =
            (position.thresholds.confidence_exit_floor, check.confidence)
        {
            if confidence < floor {
                return Some((ExitReason::ConfidenceDrop, candle.close));
            }
        }

        // 5. Regime change relative to the regime at entry.
        if position.thresholds.exit_on_regime_change && check.regime != position.entry_regime {
            return Some((ExitReason::RegimeChange, candle.close));
        }

        // 6. HTF trailing stop.
        if let Some(mult) = position.thresholds.htf_trailing_mult {
            if let Some(trail) = self.trail_level(position, check, mult) {
                let crossed = match position.side {
                    Side::Long => candle.close < trail,
                    Side::Short => candle.close > trail,
                };
                if crossed {
                    return Some((ExitReason::HtfTrailing, candle.close));
                }
            }
        }

        None
    }

    /// Trailing level: ATR multiple off the best price, tightened to the
    /// nearest HTF retracement level between it and the best price when
    /// HTF context is available.
    fn trail_level(&self, position: &Position, check: &ExitCheck<'_>, mult: f64) -> Option<f64> {
        if !check.atr.is_finite() || check.atr <= 0.0 {
            return None;
        }
        let base = match position.side {
            Side::Long => position.best_price - mult * check.atr,
            Side::Short => position.best_price + mult * check.atr,
        };

        if !check.htf.available {
            return Some(base);
        }

        // A retracement level between the ATR trail and the best price acts
        // as the tighter line in the sand.
        let mut trail = base;
        for (_, &price) in check.htf.levels.iter() {
            match position.side {
                Side::Long => {
                    if price > trail && price < position.best_price {
                        trail = price;
                    }
                }
                Side::Short => {
                    if price < trail && price > position.best_price {
                        trail = price;
                    }
                }
            }
        }
        Some(trail)
    }
}
