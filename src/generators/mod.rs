//! Seeded generators: the only source of variation visible to a sketch.
//!
//! Both generators are keyed by a single 32-bit seed and are pure functions of
//! that seed and their own internal state. Reseeding restarts them from
//! scratch.

pub mod noise;
pub mod prng;

pub use noise::{NoiseDetail, NoiseField};
pub use prng::Prng;

/// Reduce a request seed to the 32-bit key the generators use.
///
/// Wraps modulo 2^32 so negative seeds map onto the same key space.
pub fn seed_key(seed: i64) -> u32 {
    seed as u32
}

/// Hash a textual seed to a generator key.
///
/// Uses the 31-multiplier string hash; an empty or all-zero hash maps to `1`.
pub fn hash_text_seed(seed: &str) -> u32 {
    let mut hash: u32 = 0;
    for unit in seed.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(unit as u32);
    }
    if hash == 0 {
        1
    } else {
        hash
    }
}
