//! Position — an open trade with exit thresholds frozen at entry time.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::regime::Regime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

/// Exit thresholds computed once at entry and never mutated afterwards.
///
/// The exit evaluator reads these every bar; freezing them at entry keeps
/// a position's exit contract independent of later config-derived state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitThresholds {
    /// Absolute stop price.
    pub stop_loss: Option<f64>,
    /// Absolute take-profit price.
    pub take_profit: Option<f64>,
    pub max_holding_bars: Option<usize>,
    /// Close when per-bar confidence drops below this floor.
    pub confidence_exit_floor: Option<f64>,
    pub exit_on_regime_change: bool,
    /// ATR multiple for the higher-timeframe trailing stop.
    pub htf_trailing_mult: Option<f64>,
}

/// An open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_bar: usize,
    pub entry_ts: NaiveDateTime,
    pub entry_price: f64,
    pub size: f64,
    pub thresholds: ExitThresholds,
    /// Regime at entry, for the regime-change exit.
    pub entry_regime: Regime,
    /// Best price seen since entry (highest for longs, lowest for shorts).
    /// Anchors the trailing stop.
    pub best_price: f64,
    pub bars_held: usize,
}

impl Position {
    pub fn open(
        side: Side,
        entry_bar: usize,
        entry_ts: NaiveDateTime,
        entry_price: f64,
        size: f64,
        thresholds: ExitThresholds,
        entry_regime: Regime,
    ) -> Self {
        Self {
            side,
            entry_bar,
            entry_ts,
            entry_price,
            size,
            thresholds,
            entry_regime,
            best_price: entry_price,
            bars_held: 0,
        }
    }

    /// Unrealized P&L at `price`, in quote currency.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.side.sign() * self.size
    }

    /// Advance the holding counter and ratchet `best_price`.
    pub fn on_bar(&mut self, high: f64, low: f64) {
        self.bars_held += 1;
        match self.side {
            Side::Long => {
                if high > self.best_price {
                    self.best_price = high;
                }
            }
            Side::Short => {
                if low < self.best_price {
                    self.best_price = low;
                }
            }
        }
    }
}
