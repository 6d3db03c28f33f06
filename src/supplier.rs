//! The local view of suppliers and their keys: who we can publish as, which
//! keys exist for each of them, and where the trust endpoint lives.
//!
//! The table here is the only shared state in the whole system. It gets
//! loaded by the host, passed explicitly into every operation, mutated in
//! memory, and handed back for persistence. Nothing in it is secret: key
//! records carry public keys and (optionally) kdf salts, never a secret
//! half.

use crate::{
    crypto::{
        kdf::{self, DeriveTier, KdfSalt},
        sign::{SignKeypair, SignKeypairPublic},
    },
    error::{Error, Result},
    util::{ser::Binary, Timestamp},
};
use getset::{Getters, MutGetters, Setters};
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;
use url::Url;

/// Whether a key is the root of trust for a supplier or a day-to-day
/// release-signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Master,
    Signing,
}

impl KeyRole {
    /// The kdf tier keys of this role derive at. Master keys get the slow
    /// treatment: they attest rarely and guard everything else.
    pub fn derive_tier(&self) -> DeriveTier {
        match self {
            Self::Master => DeriveTier::Sensitive,
            Self::Signing => DeriveTier::Moderate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Signing => "signing",
        }
    }
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One key on file for a supplier. Holds everything except the secret half,
/// which never exists outside the derive-use-wipe window of an operation.
/// A record without a salt can still verify signatures, but its secret can
/// no longer be re-derived here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, MutGetters, Setters)]
#[getset(get = "pub", get_mut = "pub(crate)", set = "pub(crate)")]
pub struct SigningKey {
    /// The raw verification key bytes, stored hex.
    public_key: Binary<32>,
    /// The kdf salt, if the owner opted to retain it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<KdfSalt>,
    /// Master or signing.
    #[serde(rename = "type")]
    key_role: KeyRole,
    /// When the key was created.
    created_at: Timestamp,
}

impl SigningKey {
    pub fn new(public_key: Binary<32>, salt: Option<KdfSalt>, key_role: KeyRole, created_at: Timestamp) -> Self {
        Self {
            public_key,
            salt,
            key_role,
            created_at,
        }
    }

    /// The typed public key, ready to verify with.
    pub fn public(&self) -> SignKeypairPublic {
        SignKeypairPublic::Ed25519(self.public_key.clone())
    }

    /// Can this key's secret half still be re-derived here?
    pub fn derivable(&self) -> bool {
        self.salt.is_some()
    }

    /// Re-derive this key's secret half from a password and check (in
    /// constant time) that it reproduces the public key on file. A password
    /// that derives some *other* key is rejected outright, never used.
    pub fn derive_checked(&self, password: &[u8]) -> Result<SignKeypair> {
        let salt = self.salt.as_ref().ok_or(Error::KeySaltMissing)?;
        let keypair = kdf::derive_signing_keypair(password, salt.as_ref(), self.key_role.derive_tier())?;
        let derived = SignKeypairPublic::from(&keypair);
        let matches: bool = derived.as_ref().ct_eq(self.public_key.as_ref()).into();
        if !matches {
            Err(Error::InvalidPassword)?;
        }
        Ok(keypair)
    }
}

/// An authentication token for the trust endpoint. Opaque to us: the
/// endpoint mints it at login and we hand it back on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new<T: Into<String>>(token: T) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything we know about one supplier: their endpoint token (if we've
/// logged in) and their keys, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Getters, MutGetters, Setters)]
#[getset(get = "pub", get_mut = "pub(crate)", set = "pub(crate)")]
pub struct Supplier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<AccessToken>,
    #[serde(default)]
    signing_keys: Vec<SigningKey>,
}

impl Supplier {
    /// No keys at all yet?
    pub fn is_empty(&self) -> bool {
        self.signing_keys.is_empty()
    }

    /// Is there at least one master key on file (salt or no salt)?
    pub fn has_master(&self) -> bool {
        self.signing_keys.iter().any(|key| key.key_role() == &KeyRole::Master)
    }

    /// Master keys that can still attest: role master, salt retained.
    pub fn usable_masters(&self) -> Vec<&SigningKey> {
        self.signing_keys
            .iter()
            .filter(|key| key.key_role() == &KeyRole::Master && key.derivable())
            .collect()
    }

    /// Keys offered for signing a release artifact: day-to-day signing
    /// keys, with masters included only when the caller asks for them. The
    /// list is not salt-filtered; a salt-less choice gets rejected after
    /// selection, where the operator can see why.
    pub fn release_signing_keys(&self, include_masters: bool) -> Vec<&SigningKey> {
        self.signing_keys
            .iter()
            .filter(|key| include_masters || key.key_role() == &KeyRole::Signing)
            .collect()
    }

    /// Every public key on file, the candidate set for verification.
    pub fn verification_keys(&self) -> Vec<SignKeypairPublic> {
        self.signing_keys.iter().map(|key| key.public()).collect()
    }

    /// Find a key by its public half.
    pub fn find_key(&self, public_key: &Binary<32>) -> Option<&SigningKey> {
        self.signing_keys.iter().find(|key| key.public_key() == public_key)
    }

    pub(crate) fn push_key(&mut self, key: SigningKey) {
        self.signing_keys.push(key);
    }

    /// Drop a key from the record, returning it if it was there.
    pub(crate) fn remove_key(&mut self, public_key: &Binary<32>) -> Option<SigningKey> {
        let idx = self.signing_keys.iter().position(|key| key.public_key() == public_key)?;
        Some(self.signing_keys.remove(idx))
    }
}

/// The whole local table, keyed by supplier name. Serializes as the JSON
/// object the host's config store reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupplierTable(BTreeMap<String, Supplier>);

impl SupplierTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Supplier> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Supplier> {
        self.0.get_mut(name)
    }

    /// Look up a supplier that must already exist.
    pub fn supplier(&self, name: &str) -> Result<&Supplier> {
        self.0.get(name).ok_or(Error::SupplierNotFound)
    }

    pub fn supplier_mut(&mut self, name: &str) -> Result<&mut Supplier> {
        self.0.get_mut(name).ok_or(Error::SupplierNotFound)
    }

    /// Fetch a supplier record, creating an empty one if it's new to us.
    pub fn ensure(&mut self, name: &str) -> &mut Supplier {
        self.0.entry(name.to_string()).or_default()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

/// The remote service that stores public keys, accepts attested
/// key-management messages, and hands back signed responses. The public key
/// here is configured out of band and is the only key responses are ever
/// verified against; a key advertised inside a payload is never trusted.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct TrustEndpoint {
    /// Base url that request paths join onto.
    url: Url,
    /// The key the endpoint signs its responses with.
    public_key: SignKeypairPublic,
}

impl TrustEndpoint {
    pub fn new(url: Url, public_key: SignKeypairPublic) -> Self {
        Self { url, public_key }
    }
}
