//! Keyed deterministic randomness
//!
//! Every draw is a pure function of the run seed and a key
//! `(purpose, parts...)`, so the outcome of a roll never depends on how many
//! other rolls happened earlier in the tick. Multi-draw work (wall texture,
//! scenario scatter, child vitals) takes a `ChaCha8Rng` stream seeded from
//! the same keyed hash.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Seeded, stateless random source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetRng {
    seed: u64,
}

impl DetRng {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Derive a seed from free text (e.g. a world name)
    pub fn from_text(text: &str) -> Self {
        Self::new(splitmix64(fnv1a(FNV_OFFSET, text.as_bytes())))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Raw 64-bit hash of `(seed, purpose, parts)`
    pub fn key(&self, purpose: &str, parts: &[u64]) -> u64 {
        let mut hash = fnv1a(FNV_OFFSET, &self.seed.to_le_bytes());
        hash = fnv1a(hash, purpose.as_bytes());
        for part in parts {
            hash = fnv1a(hash, b"|");
            hash = fnv1a(hash, &part.to_le_bytes());
        }
        splitmix64(hash)
    }

    /// Uniform value in `[0, 1)`
    pub fn roll(&self, purpose: &str, parts: &[u64]) -> f32 {
        let bits = self.key(purpose, parts) >> 40;
        bits as f32 / (1u64 << 24) as f32
    }

    /// Uniform integer in `lo..=hi`
    pub fn range(&self, purpose: &str, parts: &[u64], lo: i32, hi: i32) -> i32 {
        if hi <= lo {
            return lo;
        }
        let span = (hi - lo + 1) as u64;
        lo + (self.key(purpose, parts) % span) as i32
    }

    pub fn chance(&self, purpose: &str, parts: &[u64], probability: f32) -> bool {
        self.roll(purpose, parts) < probability
    }

    /// Independent multi-draw stream for a key
    pub fn stream(&self, purpose: &str, parts: &[u64]) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.key(purpose, parts))
    }
}

/// Fold a signed coordinate into a key part
pub fn coord_part(value: i32) -> u64 {
    value as i64 as u64
}
