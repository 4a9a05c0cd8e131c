//! Decision engine — the ordered gate pipeline.
//!
//! Consumes probabilities, confidence, regime, and Fibonacci context plus
//! persistent strategy state; emits an action, a position size, and a
//! machine-readable reason. The engine short-circuits on the first veto,
//! so exactly one gate owns every rejection. Missing/NaN required inputs
//! are checked before gate 1 and fail safe to `none`.

pub mod gates;
pub mod state;

pub use gates::{Candidate, FibGate, FibTimeframe, Gate, GateOutcome};
pub use state::StrategyState;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::confidence::ConfidenceScore;
use crate::config::StrategyConfig;
use crate::domain::{ProbabilityPair, Side};
use crate::features::FeatureVector;
use crate::fib::FibContext;
use crate::regime::Regime;

use gates::{
    ConfidenceGate, CooldownGate, EvGate, HysteresisGate, ProbaGate, SizingGate, TieBreakGate,
    ZoneSelectGate,
};

/// Trade action emitted per bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Long,
    Short,
    None,
}

impl From<Side> for Action {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => Action::Long,
            Side::Short => Action::Short,
        }
    }
}

/// Machine-readable reason codes. Closed enumeration; serialized in the
/// wire spelling consumers match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    EvBlock,
    ProbaBlock,
    EdgeTooSmall,
    HtfFibBlock,
    LtfFibBlock,
    HysteresisBlock,
    CooldownBlock,
    ConfidenceBlock,
    SizingError,
    MissingData,
    Ok,
}

impl Reason {
    /// The wire spelling, matching the serialized form.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Reason::EvBlock => "EV_BLOCK",
            Reason::ProbaBlock => "PROBA_BLOCK",
            Reason::EdgeTooSmall => "EDGE_TOO_SMALL",
            Reason::HtfFibBlock => "HTF_FIB_BLOCK",
            Reason::LtfFibBlock => "LTF_FIB_BLOCK",
            Reason::HysteresisBlock => "HYSTERESIS_BLOCK",
            Reason::CooldownBlock => "COOLDOWN_BLOCK",
            Reason::ConfidenceBlock => "CONFIDENCE_BLOCK",
            Reason::SizingError => "SIZING_ERROR",
            Reason::MissingData => "MISSING_DATA",
            Reason::Ok => "OK",
        }
    }
}

/// Snapshot of the values each gate saw, for audit and tests.
pub type GateSnapshot = BTreeMap<String, f64>;

/// The decision for one bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResult {
    pub action: Action,
    pub size: f64,
    pub reason: Reason,
    pub gates: GateSnapshot,
}

impl DecisionResult {
    fn none(reason: Reason, gates: GateSnapshot) -> Self {
        Self {
            action: Action::None,
            size: 0.0,
            reason,
            gates,
        }
    }
}

/// Per-bar inputs to the decision engine, all as-of the current bar.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub bar: usize,
    pub features: &'a FeatureVector,
    pub probabilities: ProbabilityPair,
    pub confidence: ConfidenceScore,
    pub regime: Regime,
    pub htf: &'a FibContext,
    pub ltf: &'a FibContext,
}

/// The gate pipeline, built once per run from a validated config.
pub struct DecisionEngine {
    gates: Vec<Box<dyn Gate>>,
}

impl DecisionEngine {
    pub fn new(config: &StrategyConfig) -> Self {
        let gates: Vec<Box<dyn Gate>> = vec![
            Box::new(EvGate::new(config.ev)),
            Box::new(ZoneSelectGate::new(
                config.thresholds.clone(),
                config.atr_zones,
            )),
            Box::new(ProbaGate),
            Box::new(TieBreakGate::new(config.ev.min_edge)),
            Box::new(FibGate::new(FibTimeframe::Htf, config.fib)),
            Box::new(FibGate::new(FibTimeframe::Ltf, config.fib)),
            Box::new(HysteresisGate),
            Box::new(CooldownGate),
            Box::new(ConfidenceGate::new(config.confidence.entry_floor.clone())),
            Box::new(SizingGate::new(config.risk_map.clone(), config.max_position)),
        ];
        Self { gates }
    }

    /// Evaluate one bar. Mutates `state` (hysteresis bookkeeping) exactly
    /// as far as the pipeline advances — strict sequential semantics.
    pub fn decide(
        &self,
        ctx: &DecisionContext<'_>,
        state: &mut StrategyState,
    ) -> DecisionResult {
        let mut snapshot = GateSnapshot::new();
        snapshot.insert("p_buy".into(), ctx.probabilities.p_buy);
        snapshot.insert("p_sell".into(), ctx.probabilities.p_sell);

        // Fail-safe precheck, before gate 1: no NaN reaches the pipeline.
        if !ctx.probabilities.is_valid()
            || !ctx.confidence.value().is_finite()
            || ctx.features.first_non_finite().is_some()
        {
            return DecisionResult::none(Reason::MissingData, snapshot);
        }

        let mut candidate = Candidate::default();
        for gate in &self.gates {
            if let GateOutcome::Veto(reason) =
                gate.evaluate(ctx, state, &mut candidate, &mut snapshot)
            {
                return DecisionResult::none(reason, snapshot);
            }
        }

        let side = match candidate.side {
            Some(s) => s,
            // Defensive: a full pass without a side is a sizing fault.
            None => return DecisionResult::none(Reason::SizingError, snapshot),
        };

        DecisionResult {
            action: side.into(),
            size: candidate.size,
            reason: Reason::Ok,
            gates: snapshot,
        }
    }
}
