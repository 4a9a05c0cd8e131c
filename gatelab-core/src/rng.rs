//! Deterministic seed hierarchy for trial fan-out.
//!
//! A master seed expands into per-(config, trial) sub-seeds via BLAKE3, so
//! derivation is independent of the order trials are scheduled in. The
//! replay path itself is deterministic and never draws from an RNG; the
//! seeds exist so callers that perturb inputs (synthetic data, robustness
//! sweeps) stay reproducible and the seed lands in run metadata.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::domain::ConfigHash;

/// Deterministic seed hierarchy.
#[derive(Debug, Clone)]
pub struct SeedHierarchy {
    master_seed: u64,
}

impl SeedHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive the sub-seed for a (config, trial) pair. Order-independent:
    /// deriving trial 3 before trial 0 changes nothing.
    pub fn sub_seed(&self, config_hash: &ConfigHash, trial: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(config_hash.0.as_bytes());
        hasher.update(&trial.to_le_bytes());
        let hash = hasher.finalize();
        u64::from_le_bytes(hash.as_bytes()[..8].try_into().expect("hash is 32 bytes"))
    }

    /// A seeded StdRng for a (config, trial) pair.
    pub fn rng_for(&self, config_hash: &ConfigHash, trial: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(config_hash, trial))
    }
}
