//! Deterministic random number generation.
//!
//! RULE: Nothing in the engine may call a platform RNG for decisions.
//! Every random draw (simulated regulator outages, sampling in tools)
//! flows through a `StreamRng` derived from a configured seed.
//!
//! Each consumer gets its own stream, seeded from (seed XOR slot), so
//! adding a new consumer never shifts an existing consumer's draws.
//! Identifiers are NOT drawn from here; they use UUIDv4.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG stream.
pub struct StreamRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StreamRng {
    pub fn new(seed: u64, slot: StreamSlot) -> Self {
        let derived_seed = seed ^ (slot as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            name: slot.name(),
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        use rand::RngCore;
        self.inner.next_u64()
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries. Only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Regulator = 0,
    Runner = 1,
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Regulator => "regulator",
            Self::Runner => "runner",
        }
    }
}
