//! TradeRecord — a completed round-trip trade with its exit reason.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::position::Side;

/// Why a position was closed. Fixed evaluation order; first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    MaxHold,
    ConfidenceDrop,
    RegimeChange,
    HtfTrailing,
    /// Forced close when the candle series ends with a position open.
    EndOfData,
}

/// A complete round-trip trade record: entry → exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub side: Side,

    pub entry_bar: usize,
    pub entry_ts: NaiveDateTime,
    pub entry_price: f64,

    pub exit_bar: usize,
    pub exit_ts: NaiveDateTime,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    pub size: f64,

    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,

    pub bars_held: usize,
}

impl TradeRecord {
    /// Return on the trade as a fraction of entry cost.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 || self.size == 0.0 {
            return 0.0;
        }
        self.net_pnl / (self.entry_price * self.size)
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }
}
