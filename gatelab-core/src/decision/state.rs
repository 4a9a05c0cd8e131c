//! Persistent strategy state — owned exclusively by one replay run.
//!
//! Mutated once per bar in strict order; never shared across concurrent
//! runs. Hysteresis streaks are keyed by bar index, so a gap (a bar where
//! no candidate survived the earlier gates) breaks the streak without any
//! explicit notification.

use serde::{Deserialize, Serialize};

use crate::config::StrategyConfig;
use crate::domain::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyState {
    hysteresis_bars: usize,
    cooldown_bars: usize,

    /// Candidate side currently accumulating a streak.
    pending_side: Option<Side>,
    pending_streak: usize,
    /// Bar index of the last streak observation; a non-adjacent bar resets.
    last_pending_bar: Option<usize>,

    /// Direction and bar of the last entry actually taken.
    last_signal: Option<(Side, usize)>,
    /// Entries are blocked while bar <= cooldown_until.
    cooldown_until: Option<usize>,

    /// ATR-percentile zone boundaries, cached from config at run start.
    atr_zone_bounds: (f64, f64),
}

impl StrategyState {
    pub fn new(config: &StrategyConfig) -> Self {
        Self {
            hysteresis_bars: config.hysteresis_bars,
            cooldown_bars: config.cooldown_bars,
            pending_side: None,
            pending_streak: 0,
            last_pending_bar: None,
            last_signal: None,
            cooldown_until: None,
            atr_zone_bounds: (config.atr_zones.low_max, config.atr_zones.high_min),
        }
    }

    pub fn atr_zone_bounds(&self) -> (f64, f64) {
        self.atr_zone_bounds
    }

    pub fn last_signal(&self) -> Option<(Side, usize)> {
        self.last_signal
    }

    /// Observe a surviving candidate at `bar` and return the updated streak.
    ///
    /// Consecutive bars with the same side extend the streak; a different
    /// side or a gap restarts it at 1.
    pub fn observe_candidate(&mut self, side: Side, bar: usize) -> usize {
        let consecutive =
            self.pending_side == Some(side) && self.last_pending_bar == Some(bar.wrapping_sub(1));
        if consecutive {
            self.pending_streak += 1;
        } else {
            self.pending_side = Some(side);
            self.pending_streak = 1;
        }
        self.last_pending_bar = Some(bar);
        self.pending_streak
    }

    /// Does taking `side` at this point flip the last traded direction?
    pub fn is_flip(&self, side: Side) -> bool {
        match self.last_signal {
            Some((last, _)) => last != side,
            None => true, // first signal of the run counts as a flip
        }
    }

    pub fn hysteresis_bars(&self) -> usize {
        self.hysteresis_bars
    }

    /// Record an entry actually taken (called by the replay engine).
    pub fn record_entry(&mut self, side: Side, bar: usize) {
        self.last_signal = Some((side, bar));
        self.pending_side = None;
        self.pending_streak = 0;
        self.last_pending_bar = None;
    }

    /// Record an exit and start the cooldown window.
    pub fn record_exit(&mut self, bar: usize) {
        self.cooldown_until = Some(bar + self.cooldown_bars);
    }

    /// True while entries are blocked by the post-exit cooldown.
    pub fn in_cooldown(&self, bar: usize) -> bool {
        matches!(self.cooldown_until, Some(until) if bar <= until)
    }
}
