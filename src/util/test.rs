//! Helpers for tests. Mostly about making randomness hold still.

use rand::SeedableRng;

/// A seeded rng for tests that want the same "random" bytes on every run.
pub(crate) fn rng() -> rand_chacha::ChaCha20Rng {
    rand_chacha::ChaCha20Rng::from_seed([42u8; 32])
}
