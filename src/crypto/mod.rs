//! The crypto module contains our cryptographic primitives: deriving signing
//! keys from passwords and signing/verifying data, both in-memory and
//! streamed from artifact files.
//!
//! The idea here is that specific algorithms are wrapped in descriptive
//! interfaces that allow high-level use of the encapsulated cryptographic
//! algorithms without needing to know the details of those algorithms. A
//! `SignKeypair` has a standard interface but can describe any number of
//! signing algorithms, so the primitives can be expanded without building
//! new interfaces around them.

use rand::{rngs::OsRng, RngCore, SeedableRng};

pub mod kdf;
pub mod sign;

pub use kdf::*;
pub use sign::*;

/// A convenience function that returns a ChaCha20 CSRNG seeded with OS random bytes. Use this if
/// you want a nice, strong random number generator, you don't want to wire one up yourself, and
/// your platform provides good entropy.
///
/// This can be used as an input to any function here that accepts `&mut rng`. Otherwise, you can
/// bring your own RNG that implements [`RngCore`].
pub fn rng_chacha20() -> rand_chacha::ChaCha20Rng {
    let mut seed_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut seed_bytes);
    rand_chacha::ChaCha20Rng::from_seed(seed_bytes)
}
