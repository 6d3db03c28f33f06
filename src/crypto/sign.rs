//! The sign system allows creating cryptographic signatures which allow data
//! to be transmitted to others without fear of tampering.
//!
//! Two shapes of data get signed here. Small in-memory messages (attested
//! key-management messages, response envelopes) are signed over their raw
//! bytes. Artifact files are streamed through a blake3 digest and the
//! signature covers the 32-byte digest, so a multi-hundred-megabyte archive
//! never has to sit in memory to be signed or checked.

use crate::{
    error::{Error, Result},
    util::ser::{self, Binary, BinarySecret},
};
use rand::{CryptoRng, RngCore};
use serde_derive::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;

/// How many bytes we pull per read when streaming an artifact into a digest.
const STREAM_BUF_SIZE: usize = 32768;

/// A signature derived from a signing keypair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignKeypairSignature {
    Ed25519(Binary<64>),
}

impl SignKeypairSignature {
    /// Build a signature from its raw bytes, checking length.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        Ok(Self::Ed25519(Binary::from_slice(slice)?))
    }

    /// Parse a signature from its padded url-safe base64 form (the encoding
    /// used in detached signature files and the response envelope).
    pub fn from_base64(s: &str) -> Result<Self> {
        Self::from_slice(&ser::base64_decode(s.as_bytes())?)
    }

    /// The padded url-safe base64 form. Always 88 characters.
    pub fn to_base64(&self) -> String {
        ser::base64_encode(self.as_ref())
    }
}

impl AsRef<[u8]> for SignKeypairSignature {
    fn as_ref(&self) -> &[u8] {
        match self {
            Self::Ed25519(sig) => sig.as_ref(),
        }
    }
}

/// An asymmetric signing keypair. The secret half, when present, is held in
/// wiped-on-drop memory and there is deliberately no way to clone, persist,
/// or serialize it. Keypairs with secrets come from
/// [derive_signing_keypair][crate::crypto::kdf::derive_signing_keypair] and
/// die at the end of the operation that derived them.
#[derive(Debug)]
pub enum SignKeypair {
    /// Ed25519 signing keypair
    Ed25519 {
        public: Binary<32>,
        secret: Option<BinarySecret<32>>,
    },
}

impl SignKeypair {
    /// Create a new ed25519 keypair from random bytes.
    pub fn new_ed25519<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut randbuf = [0u8; 32];
        rng.fill_bytes(&mut randbuf);
        Self::new_ed25519_from_seed(&BinarySecret::new(randbuf))
    }

    /// Create a new ed25519 keypair from a 32-byte seed (generally, one that
    /// came out of the kdf).
    pub fn new_ed25519_from_seed(seed: &BinarySecret<32>) -> Self {
        let secret = ed25519_consensus::SigningKey::from(*seed.expose_secret());
        let public = secret.verification_key();
        Self::Ed25519 {
            public: Binary::new(public.to_bytes()),
            secret: Some(BinarySecret::new(secret.to_bytes())),
        }
    }

    /// Sign a message with this keypair's secret key.
    pub fn sign(&self, data: &[u8]) -> Result<SignKeypairSignature> {
        match self {
            Self::Ed25519 {
                secret: ref sec_maybe, ..
            } => {
                let sec_bytes = sec_maybe.as_ref().ok_or(Error::CryptoKeyMissing)?;
                let seckey = ed25519_consensus::SigningKey::from(*sec_bytes.expose_secret());
                let sig_obj = seckey.sign(data);
                Ok(SignKeypairSignature::Ed25519(Binary::new(sig_obj.to_bytes())))
            }
        }
    }

    /// Verify a value with a detached signature given the public key of the
    /// signer.
    pub fn verify(&self, signature: &SignKeypairSignature, data: &[u8]) -> Result<()> {
        match (self, signature) {
            (
                Self::Ed25519 {
                    public: ref pubkey_bytes, ..
                },
                SignKeypairSignature::Ed25519(ref sig_bytes),
            ) => {
                let pubkey = ed25519_consensus::VerificationKey::try_from(*pubkey_bytes.deref())
                    .map_err(|_| Error::MissingOrInvalidSignature)?;
                let sig_arr: [u8; 64] = *sig_bytes.deref();
                let sig = ed25519_consensus::Signature::from(sig_arr);
                pubkey.verify(&sig, data).map_err(|_| Error::MissingOrInvalidSignature)?;
                Ok(())
            }
        }
    }

    /// Does this keypair carry its secret half?
    pub fn has_private(&self) -> bool {
        match self {
            Self::Ed25519 { secret: sec_maybe, .. } => sec_maybe.is_some(),
        }
    }
}

impl PartialEq for SignKeypair {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ed25519 { public: public1, .. }, Self::Ed25519 { public: public2, .. }) => public1 == public2,
        }
    }
}

/// An asymmetric signing public key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignKeypairPublic {
    /// Ed25519 signing public key
    Ed25519(Binary<32>),
}

impl SignKeypairPublic {
    /// Build a public key from its raw bytes, checking length.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        Ok(Self::Ed25519(Binary::from_slice(slice)?))
    }

    /// Build a public key from the hex form key records store.
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self::Ed25519(Binary::from_hex(s)?))
    }

    /// The hex form key records store.
    pub fn to_hex(&self) -> String {
        match self {
            Self::Ed25519(pubkey) => pubkey.to_hex(),
        }
    }

    /// The raw key bytes in the fixed-width form key records hold.
    pub fn to_binary(&self) -> Binary<32> {
        match self {
            Self::Ed25519(pubkey) => pubkey.clone(),
        }
    }

    /// Verify a value with a detached signature given the public key of the
    /// signer.
    pub fn verify(&self, signature: &SignKeypairSignature, data: &[u8]) -> Result<()> {
        // this clone()s, but at least we aren't duplicating code anymore
        let keypair = match self {
            SignKeypairPublic::Ed25519(pubkey) => SignKeypair::Ed25519 {
                public: pubkey.clone(),
                secret: None,
            },
        };
        keypair.verify(signature, data)
    }
}

impl AsRef<[u8]> for SignKeypairPublic {
    fn as_ref(&self) -> &[u8] {
        match self {
            Self::Ed25519(pubkey) => pubkey.as_ref(),
        }
    }
}

impl From<&SignKeypair> for SignKeypairPublic {
    fn from(kp: &SignKeypair) -> Self {
        match kp {
            SignKeypair::Ed25519 { public, .. } => Self::Ed25519(public.clone()),
        }
    }
}

/// Stream a file through blake3 and hand back the 32-byte digest.
pub fn hash_artifact<P: AsRef<Path>>(path: P) -> Result<[u8; 32]> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; STREAM_BUF_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[0..read]);
    }
    Ok(*hasher.finalize().as_bytes())
}

/// Sign an artifact file, streaming it from disk. The signature covers the
/// file's blake3 digest.
pub fn sign_file<P: AsRef<Path>>(path: P, keypair: &SignKeypair) -> Result<SignKeypairSignature> {
    let digest = hash_artifact(path)?;
    keypair.sign(&digest)
}

/// Check an artifact file against one public key. A bad signature is a
/// `false`, not an error; only failing to read the file errors.
pub fn verify_file<P: AsRef<Path>>(path: P, public: &SignKeypairPublic, signature: &SignKeypairSignature) -> Result<bool> {
    let digest = hash_artifact(path)?;
    Ok(public.verify(signature, &digest).is_ok())
}

/// Check an artifact file against every candidate key, succeeding if any one
/// of them verifies. An artifact signed by any currently valid key for a
/// supplier is accepted, not just the most recent.
pub fn verify_file_any<P: AsRef<Path>>(
    path: P,
    candidates: &[SignKeypairPublic],
    signature: &SignKeypairSignature,
) -> Result<bool> {
    let digest = hash_artifact(path)?;
    Ok(candidates.iter().any(|public| public.verify(signature, &digest).is_ok()))
}
