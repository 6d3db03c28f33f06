//! Password-based key derivation. A supplier's signing keys are never stored
//! anywhere, not even encrypted: what gets stored is a salt, and the secret
//! half of a key is re-derived from the password plus that salt every time
//! it's needed, then thrown away again.
//!
//! Derivation runs argon2id down to a 32-byte seed, and the seed becomes an
//! ed25519 keypair. The whole pipeline is deterministic, which is the point:
//! the same password and salt always land on the same keypair, so a stored
//! public key is enough to check a password without storing anything secret.

use crate::{
    crypto::sign::SignKeypair,
    error::{Error, Result},
    util::ser::{Binary, BinarySecret},
};
use rand::{CryptoRng, RngCore};
use serde_derive::{Deserialize, Serialize};

/// A constant that provides a default for CPU difficulty for interactive key derivation
pub const KDF_OPS_INTERACTIVE: u32 = 2;
/// A constant that provides a default for mem difficulty for interactive key derivation
pub const KDF_MEM_INTERACTIVE: u32 = 65536;

/// A constant that provides a default for CPU difficulty for moderate key derivation
pub const KDF_OPS_MODERATE: u32 = 3;
/// A constant that provides a default for mem difficulty for moderate key derivation
pub const KDF_MEM_MODERATE: u32 = 262144;

/// A constant that provides a default for CPU difficulty for sensitive key derivation
pub const KDF_OPS_SENSITIVE: u32 = 4;
/// A constant that provides a default for mem difficulty for sensitive key derivation
pub const KDF_MEM_SENSITIVE: u32 = 1048576;

/// How much work goes into deriving a key from a password. Master keys get
/// the sensitive treatment, day-to-day signing keys the moderate one, and
/// interactive is for things a person is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeriveTier {
    Interactive,
    Moderate,
    Sensitive,
}

impl DeriveTier {
    /// The (ops, mem) cost pair this tier runs the kdf at.
    pub fn costs(&self) -> (u32, u32) {
        match self {
            Self::Interactive => (KDF_OPS_INTERACTIVE, KDF_MEM_INTERACTIVE),
            Self::Moderate => (KDF_OPS_MODERATE, KDF_MEM_MODERATE),
            Self::Sensitive => (KDF_OPS_SENSITIVE, KDF_MEM_SENSITIVE),
        }
    }
}

/// The 16-byte salt a password derives against. This is the only piece of
/// key material that gets written into a supplier record (as hex), and
/// losing it means the key can never be re-derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfSalt(Binary<16>);

impl KdfSalt {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(Binary::new(bytes))
    }

    /// Generate a fresh random salt.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        Self(Binary::new(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(Binary::from_hex(s)?))
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl AsRef<[u8]> for KdfSalt {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

/// Derive a 32-byte signing seed from a passphrase/salt at the given tier's
/// costs. Same inputs, same seed, every time.
pub fn derive_seed(passphrase: &[u8], salt_bytes: &[u8], tier: DeriveTier) -> Result<BinarySecret<32>> {
    const LEN: usize = 32;
    if passphrase.is_empty() {
        Err(Error::WeakInput)?;
    }
    let salt: &[u8; 16] = salt_bytes
        .get(0..16)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(Error::CryptoBadSalt)?;
    let (ops, mem) = tier.costs();
    let mut key = [0u8; 32];
    let argon2_ctx = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::new(mem, ops, 1, Some(LEN)).map_err(|_| Error::CryptoKDFFailed)?,
    );
    argon2_ctx
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|_| Error::CryptoKDFFailed)?;
    Ok(BinarySecret::new(key))
}

/// Derive a complete signing keypair from a passphrase. The one true path
/// from a password to a usable key.
pub fn derive_signing_keypair(passphrase: &[u8], salt_bytes: &[u8], tier: DeriveTier) -> Result<SignKeypair> {
    let seed = derive_seed(passphrase, salt_bytes, tier)?;
    Ok(SignKeypair::new_ed25519_from_seed(&seed))
}
