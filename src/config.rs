//! OBLIVION - Filter Configuration
//! Tunable parameters for bloom filter construction.

use serde::{Deserialize, Serialize};

use crate::error::{OblivionError, Result};

/// Upper bound for hash rounds picked by [`FilterConfig::with_optimal_hash_rounds`].
const MAX_OPTIMAL_ROUNDS: u32 = 30;

/// Configuration for building bloom filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Bits allocated per filtered key (size/accuracy trade-off).
    pub bits_per_key: u32,

    /// Number of bit positions derived per key (`k`).
    pub hash_rounds: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            bits_per_key: 10,
            hash_rounds: 3,
        }
    }
}

impl FilterConfig {
    /// Create a new FilterConfig with explicit parameters.
    pub fn new(bits_per_key: u32, hash_rounds: u32) -> Self {
        Self {
            bits_per_key,
            hash_rounds,
        }
    }

    /// Set the number of bits per key.
    pub fn with_bits_per_key(mut self, bits_per_key: u32) -> Self {
        self.bits_per_key = bits_per_key;
        self
    }

    /// Set the number of hash rounds.
    pub fn with_hash_rounds(mut self, hash_rounds: u32) -> Self {
        self.hash_rounds = hash_rounds;
        self
    }

    /// Derive `k` from bits-per-key: `k = bits_per_key * ln(2)`, clamped to `[1, 30]`.
    pub fn with_optimal_hash_rounds(mut self) -> Self {
        let k = (self.bits_per_key as f64 * std::f64::consts::LN_2).round() as u32;
        self.hash_rounds = k.clamp(1, MAX_OPTIMAL_ROUNDS);
        self
    }

    /// Reject parameters that cannot produce a usable filter.
    pub fn validate(&self) -> Result<()> {
        if self.bits_per_key == 0 {
            return Err(OblivionError::Config("bits_per_key must be > 0".into()));
        }
        if self.hash_rounds == 0 {
            return Err(OblivionError::Config("hash_rounds must be > 0".into()));
        }
        Ok(())
    }
}
