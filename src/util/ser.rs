//! Helpful serialization tools.
//!
//! Binary values in this system travel in two text encodings and nothing
//! else: lowercase hex in stored records and request fields (public keys,
//! salts), and padded url-safe base64 for detached signatures and the signed
//! response envelope. The helpers and wrapper types here pin those encodings
//! down in one place so the rest of the crate can't get creative.

use crate::error::{Error, Result};
use base64::Engine;
use std::ops::Deref;
use zeroize::Zeroize;

/// Convert bytes to padded url-safe base64 (the signature encoding).
pub fn base64_encode<T: AsRef<[u8]>>(bytes: T) -> String {
    base64::engine::general_purpose::URL_SAFE.encode(bytes.as_ref())
}

/// Decode padded url-safe base64.
pub fn base64_decode<T: AsRef<[u8]>>(bytes: T) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::URL_SAFE.decode(bytes.as_ref())?)
}

/// Convert bytes to lowercase hex (the stored-record encoding).
pub fn hex_encode<T: AsRef<[u8]>>(bytes: T) -> String {
    hex::encode(bytes.as_ref())
}

/// Decode hex into bytes.
pub fn hex_decode<T: AsRef<[u8]>>(bytes: T) -> Result<Vec<u8>> {
    hex::decode(bytes.as_ref()).map_err(|_| Error::DeserializeHex)
}

/// A byte array of a fixed length, as seen in public keys, salts, and
/// signatures. Serializes as lowercase hex in human-readable formats, which
/// is the only kind we ever write (matching the stored record format).
#[derive(Clone, PartialEq, Eq)]
pub struct Binary<const N: usize>([u8; N]);

impl<const N: usize> Binary<N> {
    pub fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, checking length.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let arr: [u8; N] = slice.try_into().map_err(|_| Error::BadLength)?;
        Ok(Self(arr))
    }

    /// Build from a hex string, checking length.
    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_slice(&hex_decode(s)?)
    }

    /// The hex rendering of these bytes.
    pub fn to_hex(&self) -> String {
        hex_encode(self.0)
    }
}

impl<const N: usize> Deref for Binary<N> {
    type Target = [u8; N];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> AsRef<[u8]> for Binary<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> std::fmt::Debug for Binary<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Binary({})", self.to_hex())
    }
}

impl<const N: usize> serde::Serialize for Binary<N> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
        where S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de, const N: usize> serde::Deserialize<'de> for Binary<N> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
        where D: serde::Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A byte array holding secret material (a kdf seed, a derived signing key).
/// Wiped on drop, redacted in debug output, and very much on purpose missing
/// any serde implementations: secrets never hit a disk or a wire in this
/// system, they get re-derived from a password every time they're needed.
pub struct BinarySecret<const N: usize>([u8; N]);

impl<const N: usize> BinarySecret<N> {
    pub fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Grab the inner bytes.
    pub(crate) fn expose_secret(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> std::fmt::Debug for BinarySecret<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BinarySecret(<{} bytes hidden>)", N)
    }
}

impl<const N: usize> Drop for BinarySecret<N> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

pub(crate) mod timestamp {
    //! (De)serializes a datetime in the wire's second-precision format,
    //! `2038-01-19T03:14:07`, no timezone suffix, always UTC.

    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
        where S: Serializer,
    {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
        where D: Deserializer<'de>,
    {
        let s = <String>::deserialize(deserializer)?;
        let naive = NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)?;
        Ok(naive.and_utc())
    }
}
