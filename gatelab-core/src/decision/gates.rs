//! The ordered gates of the decision pipeline.
//!
//! Each gate inspects the context, may refine the working candidate, and
//! either passes control onward or vetoes with a reason. The engine
//! short-circuits on the first veto; no two gates can claim the same
//! rejection because evaluation order is fixed.

use crate::config::{
    AtrZone, AtrZoneConfig, EvConfig, FibConfig, MissingPolicy, RegimeValues, RiskMap,
    ThresholdConfig,
};
use crate::domain::Side;
use crate::features::names;

use super::state::StrategyState;
use super::{DecisionContext, GateSnapshot, Reason};

/// Pass/veto outcome of a single gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Pass,
    Veto(Reason),
}

/// Working state refined by the gates as the pipeline advances.
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub long_viable: bool,
    pub short_viable: bool,
    pub ev_long: f64,
    pub ev_short: f64,
    pub zone: Option<AtrZone>,
    pub threshold: Option<f64>,
    pub side: Option<Side>,
    pub size: f64,
}

/// A single pass/veto decision stage.
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(
        &self,
        ctx: &DecisionContext<'_>,
        state: &mut StrategyState,
        candidate: &mut Candidate,
        snapshot: &mut GateSnapshot,
    ) -> GateOutcome;
}

// ─── Gate 1: expected value ─────────────────────────────────────────

/// Rejects when neither direction has positive expected value.
pub struct EvGate {
    config: EvConfig,
}

impl EvGate {
    pub fn new(config: EvConfig) -> Self {
        Self { config }
    }

    fn ev(&self, p: f64) -> f64 {
        p * self.config.payoff_ratio - (1.0 - p) - self.config.cost
    }
}

impl Gate for EvGate {
    fn name(&self) -> &'static str {
        "ev"
    }

    fn evaluate(
        &self,
        ctx: &DecisionContext<'_>,
        _state: &mut StrategyState,
        candidate: &mut Candidate,
        snapshot: &mut GateSnapshot,
    ) -> GateOutcome {
        candidate.ev_long = self.ev(ctx.probabilities.p_buy);
        candidate.ev_short = self.ev(ctx.probabilities.p_sell);
        candidate.long_viable = candidate.ev_long > 0.0;
        candidate.short_viable = candidate.ev_short > 0.0;

        snapshot.insert("ev_long".into(), candidate.ev_long);
        snapshot.insert("ev_short".into(), candidate.ev_short);

        if !candidate.long_viable && !candidate.short_viable {
            GateOutcome::Veto(Reason::EvBlock)
        } else {
            GateOutcome::Pass
        }
    }
}

// ─── Gate 2: ATR-zone threshold selection ───────────────────────────

/// Selects the entry threshold for the current volatility zone and regime.
///
/// Never vetoes on its own; it resolves the single threshold source so the
/// probability gate that follows has exactly one number to check.
pub struct ZoneSelectGate {
    thresholds: ThresholdConfig,
    zones: AtrZoneConfig,
}

impl ZoneSelectGate {
    pub fn new(thresholds: ThresholdConfig, zones: AtrZoneConfig) -> Self {
        Self { thresholds, zones }
    }

    fn zone_for(&self, atr_pct: f64) -> AtrZone {
        if atr_pct < self.zones.low_max {
            AtrZone::Low
        } else if atr_pct >= self.zones.high_min {
            AtrZone::High
        } else {
            AtrZone::Mid
        }
    }
}

fn zone_code(zone: AtrZone) -> f64 {
    match zone {
        AtrZone::Low => 0.0,
        AtrZone::Mid => 1.0,
        AtrZone::High => 2.0,
    }
}

impl Gate for ZoneSelectGate {
    fn name(&self) -> &'static str {
        "zone_select"
    }

    fn evaluate(
        &self,
        ctx: &DecisionContext<'_>,
        _state: &mut StrategyState,
        candidate: &mut Candidate,
        snapshot: &mut GateSnapshot,
    ) -> GateOutcome {
        let atr_pct = match ctx.features.get(names::ATR_PCT) {
            Some(v) if v.is_finite() => v,
            _ => return GateOutcome::Veto(Reason::MissingData),
        };
        let zone = self.zone_for(atr_pct);
        let threshold = self.thresholds.resolve(ctx.regime, zone);
        candidate.zone = Some(zone);
        candidate.threshold = Some(threshold);

        snapshot.insert("atr_pct".into(), atr_pct);
        snapshot.insert("zone".into(), zone_code(zone));
        snapshot.insert("threshold".into(), threshold);
        GateOutcome::Pass
    }
}

// ─── Gate 3: probability threshold ──────────────────────────────────

/// Rejects viable sides whose probability does not clear the selected
/// threshold; vetoes when no side survives.
pub struct ProbaGate;

impl Gate for ProbaGate {
    fn name(&self) -> &'static str {
        "proba"
    }

    fn evaluate(
        &self,
        ctx: &DecisionContext<'_>,
        _state: &mut StrategyState,
        candidate: &mut Candidate,
        _snapshot: &mut GateSnapshot,
    ) -> GateOutcome {
        let threshold = match candidate.threshold {
            Some(t) => t,
            None => return GateOutcome::Veto(Reason::MissingData),
        };
        candidate.long_viable = candidate.long_viable && ctx.probabilities.p_buy >= threshold;
        candidate.short_viable = candidate.short_viable && ctx.probabilities.p_sell >= threshold;

        if !candidate.long_viable && !candidate.short_viable {
            GateOutcome::Veto(Reason::ProbaBlock)
        } else {
            GateOutcome::Pass
        }
    }
}

// ─── Gate 4: tie-break ──────────────────────────────────────────────

/// Picks one side when both survive, by edge margin; the rule is total:
/// equal margins fall to the larger expected value, an exact EV tie falls
/// to Long. Also enforces the minimum probability separation.
pub struct TieBreakGate {
    min_edge: f64,
}

impl TieBreakGate {
    pub fn new(min_edge: f64) -> Self {
        Self { min_edge }
    }
}

impl Gate for TieBreakGate {
    fn name(&self) -> &'static str {
        "tie_break"
    }

    fn evaluate(
        &self,
        ctx: &DecisionContext<'_>,
        _state: &mut StrategyState,
        candidate: &mut Candidate,
        snapshot: &mut GateSnapshot,
    ) -> GateOutcome {
        let threshold = candidate.threshold.unwrap_or(1.0);
        let side = match (candidate.long_viable, candidate.short_viable) {
            (true, false) => Side::Long,
            (false, true) => Side::Short,
            (true, true) => {
                let edge_long = ctx.probabilities.p_buy - threshold;
                let edge_short = ctx.probabilities.p_sell - threshold;
                if edge_long > edge_short {
                    Side::Long
                } else if edge_short > edge_long {
                    Side::Short
                } else if candidate.ev_long >= candidate.ev_short {
                    Side::Long
                } else {
                    Side::Short
                }
            }
            (false, false) => return GateOutcome::Veto(Reason::ProbaBlock),
        };

        let (p_win, p_other) = match side {
            Side::Long => (ctx.probabilities.p_buy, ctx.probabilities.p_sell),
            Side::Short => (ctx.probabilities.p_sell, ctx.probabilities.p_buy),
        };
        let edge = p_win - p_other;
        snapshot.insert("edge".into(), edge);

        if edge < self.min_edge {
            return GateOutcome::Veto(Reason::EdgeTooSmall);
        }

        candidate.side = Some(side);
        GateOutcome::Pass
    }
}

// ─── Gates 5 & 6: Fibonacci proximity (one implementation, two instances) ───

/// Which timeframe context a `FibGate` instance reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FibTimeframe {
    Htf,
    Ltf,
}

/// Proximity-to-retracement gate, parameterized by timeframe.
///
/// Instantiated twice — once for HTF, once for LTF — so the two timeframes
/// can never drift apart semantically. An unavailable context is
/// inconclusive: the configured missing policy decides.
pub struct FibGate {
    timeframe: FibTimeframe,
    config: FibConfig,
}

impl FibGate {
    pub fn new(timeframe: FibTimeframe, config: FibConfig) -> Self {
        Self { timeframe, config }
    }
}

impl Gate for FibGate {
    fn name(&self) -> &'static str {
        match self.timeframe {
            FibTimeframe::Htf => "htf_fib",
            FibTimeframe::Ltf => "ltf_fib",
        }
    }

    fn evaluate(
        &self,
        ctx: &DecisionContext<'_>,
        _state: &mut StrategyState,
        _candidate: &mut Candidate,
        snapshot: &mut GateSnapshot,
    ) -> GateOutcome {
        let (context, gate_cfg, block_reason, key) = match self.timeframe {
            FibTimeframe::Htf => (ctx.htf, self.config.htf, Reason::HtfFibBlock, "htf_proximity"),
            FibTimeframe::Ltf => (ctx.ltf, self.config.ltf, Reason::LtfFibBlock, "ltf_proximity"),
        };

        if !context.available {
            return match gate_cfg.missing_policy {
                MissingPolicy::Pass => GateOutcome::Pass,
                MissingPolicy::Block => GateOutcome::Veto(block_reason),
            };
        }

        snapshot.insert(key.into(), context.proximity_atr);

        if context.proximity_atr <= gate_cfg.tolerance_atr {
            return GateOutcome::Pass;
        }

        // An HTF block can be overridden by strong LTF evidence when
        // explicitly configured: a hit within half the LTF tolerance.
        if self.timeframe == FibTimeframe::Htf
            && self.config.ltf_override
            && ctx.ltf.available
            && ctx.ltf.proximity_atr <= self.config.ltf.tolerance_atr / 2.0
        {
            snapshot.insert("ltf_override".into(), 1.0);
            return GateOutcome::Pass;
        }

        GateOutcome::Veto(block_reason)
    }
}

// ─── Gate 7: hysteresis ─────────────────────────────────────────────

/// Requires a direction flip to persist before trading it.
pub struct HysteresisGate;

impl Gate for HysteresisGate {
    fn name(&self) -> &'static str {
        "hysteresis"
    }

    fn evaluate(
        &self,
        ctx: &DecisionContext<'_>,
        state: &mut StrategyState,
        candidate: &mut Candidate,
        snapshot: &mut GateSnapshot,
    ) -> GateOutcome {
        let side = match candidate.side {
            Some(s) => s,
            None => return GateOutcome::Veto(Reason::MissingData),
        };
        let streak = state.observe_candidate(side, ctx.bar);
        snapshot.insert("hysteresis_streak".into(), streak as f64);

        if state.is_flip(side) && streak < state.hysteresis_bars() {
            GateOutcome::Veto(Reason::HysteresisBlock)
        } else {
            GateOutcome::Pass
        }
    }
}

// ─── Gate 8: cooldown ───────────────────────────────────────────────

/// Blocks entries inside the post-exit cooldown window.
pub struct CooldownGate;

impl Gate for CooldownGate {
    fn name(&self) -> &'static str {
        "cooldown"
    }

    fn evaluate(
        &self,
        ctx: &DecisionContext<'_>,
        state: &mut StrategyState,
        _candidate: &mut Candidate,
        _snapshot: &mut GateSnapshot,
    ) -> GateOutcome {
        if state.in_cooldown(ctx.bar) {
            GateOutcome::Veto(Reason::CooldownBlock)
        } else {
            GateOutcome::Pass
        }
    }
}

// ─── Gate 9: confidence floor ───────────────────────────────────────

/// Rejects when confidence is below the regime-specific floor.
pub struct ConfidenceGate {
    floors: RegimeValues<f64>,
}

impl ConfidenceGate {
    pub fn new(floors: RegimeValues<f64>) -> Self {
        Self { floors }
    }
}

impl Gate for ConfidenceGate {
    fn name(&self) -> &'static str {
        "confidence"
    }

    fn evaluate(
        &self,
        ctx: &DecisionContext<'_>,
        _state: &mut StrategyState,
        _candidate: &mut Candidate,
        snapshot: &mut GateSnapshot,
    ) -> GateOutcome {
        let floor = *self.floors.get(ctx.regime);
        snapshot.insert("confidence".into(), ctx.confidence.value());
        snapshot.insert("confidence_floor".into(), floor);

        if ctx.confidence.value() < floor {
            GateOutcome::Veto(Reason::ConfidenceBlock)
        } else {
            GateOutcome::Pass
        }
    }
}

// ─── Gate 10: position sizing ───────────────────────────────────────

/// Maps confidence to size through the risk map.
///
/// Any internal fault surfaces as an explicit `SizingError` veto — never a
/// silent zero-size pass. A legitimate zero from the map (confidence below
/// the first row) passes with size 0.
pub struct SizingGate {
    risk_map: RiskMap,
    max_position: f64,
}

impl SizingGate {
    pub fn new(risk_map: RiskMap, max_position: f64) -> Self {
        Self {
            risk_map,
            max_position,
        }
    }
}

impl Gate for SizingGate {
    fn name(&self) -> &'static str {
        "sizing"
    }

    fn evaluate(
        &self,
        ctx: &DecisionContext<'_>,
        _state: &mut StrategyState,
        candidate: &mut Candidate,
        snapshot: &mut GateSnapshot,
    ) -> GateOutcome {
        let confidence = ctx.confidence.value();
        if !confidence.is_finite() || self.risk_map.rows.is_empty() {
            return GateOutcome::Veto(Reason::SizingError);
        }

        let size = self.risk_map.size_for(confidence);
        if !size.is_finite() || size < 0.0 {
            return GateOutcome::Veto(Reason::SizingError);
        }

        candidate.size = size.min(self.max_position);
        snapshot.insert("size".into(), candidate.size);
        GateOutcome::Pass
    }
}
