//! Probability provider boundary — the external model seen as a pure function.

use serde::{Deserialize, Serialize};

use super::position::Side;
use crate::features::FeatureVector;

/// Directional probabilities from the external model.
///
/// Both components must be finite and in [0, 1]; they need not sum to 1
/// (the model may hold probability mass for "no move").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityPair {
    pub p_buy: f64,
    pub p_sell: f64,
}

impl ProbabilityPair {
    pub fn new(p_buy: f64, p_sell: f64) -> Self {
        Self { p_buy, p_sell }
    }

    /// True if both components are finite and in [0, 1].
    pub fn is_valid(&self) -> bool {
        let in_unit = |p: f64| p.is_finite() && (0.0..=1.0).contains(&p);
        in_unit(self.p_buy) && in_unit(self.p_sell)
    }

    /// The side with the larger probability and its value.
    /// Ties report Long (total ordering, no arbitrary branch).
    pub fn stronger_side(&self) -> (Side, f64) {
        if self.p_sell > self.p_buy {
            (Side::Short, self.p_sell)
        } else {
            (Side::Long, self.p_buy)
        }
    }

    pub fn for_side(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.p_buy,
            Side::Short => self.p_sell,
        }
    }
}

/// The external probability model, consumed as a black box.
///
/// # Architecture invariant
/// The core never trains, calibrates, or mutates the provider. Given the
/// same feature vector, it must return the same pair — determinism of the
/// replay depends on it.
pub trait ProbabilityProvider: Send + Sync {
    fn probabilities(&self, features: &FeatureVector) -> ProbabilityPair;
}

/// Fixed-output provider for tests and smoke runs.
#[derive(Debug, Clone)]
pub struct ConstantProvider {
    pub pair: ProbabilityPair,
}

impl ProbabilityProvider for ConstantProvider {
    fn probabilities(&self, _features: &FeatureVector) -> ProbabilityPair {
        self.pair
    }
}

/// Provider that replays a fixed per-bar sequence, cycling if exhausted.
///
/// Lets tests script exact probability paths (oscillation, ramps) without
/// a model in the loop.
#[derive(Debug)]
pub struct SequenceProvider {
    pairs: Vec<ProbabilityPair>,
    index: std::sync::atomic::AtomicUsize,
}

impl SequenceProvider {
    pub fn new(pairs: Vec<ProbabilityPair>) -> Self {
        assert!(!pairs.is_empty(), "sequence must not be empty");
        Self {
            pairs,
            index: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

impl Clone for SequenceProvider {
    fn clone(&self) -> Self {
        Self {
            pairs: self.pairs.clone(),
            index: std::sync::atomic::AtomicUsize::new(
                self.index.load(std::sync::atomic::Ordering::Relaxed),
            ),
        }
    }
}

impl ProbabilityProvider for SequenceProvider {
    fn probabilities(&self, _features: &FeatureVector) -> ProbabilityPair {
        let i = self
            .index
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.pairs[i % self.pairs.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_pair() {
        assert!(ProbabilityPair::new(0.6, 0.3).is_valid());
        assert!(!ProbabilityPair::new(1.2, 0.3).is_valid());
        assert!(!ProbabilityPair::new(f64::NAN, 0.3).is_valid());
        assert!(!ProbabilityPair::new(0.5, -0.1).is_valid());
    }

    #[test]
    fn stronger_side_prefers_larger() {
        assert_eq!(ProbabilityPair::new(0.7, 0.2).stronger_side().0, Side::Long);
        assert_eq!(ProbabilityPair::new(0.2, 0.7).stronger_side().0, Side::Short);
    }

    #[test]
    fn stronger_side_tie_reports_long() {
        assert_eq!(ProbabilityPair::new(0.5, 0.5).stronger_side().0, Side::Long);
    }

    #[test]
    fn sequence_provider_cycles() {
        let provider = SequenceProvider::new(vec![
            ProbabilityPair::new(0.9, 0.1),
            ProbabilityPair::new(0.1, 0.9),
        ]);
        let fv = FeatureVector::default();
        assert_eq!(provider.probabilities(&fv).p_buy, 0.9);
        assert_eq!(provider.probabilities(&fv).p_buy, 0.1);
        assert_eq!(provider.probabilities(&fv).p_buy, 0.9);
    }
}
