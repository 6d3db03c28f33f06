//! The main error enum for the project lives here, and documents the various
//! conditions that can arise while interacting with the system.

use thiserror::Error;

/// This is our error enum. It contains an entry for any part of the system in
/// which an expectation is not met or a problem occurs.
#[derive(Error, Debug)]
pub enum Error {
    /// The person driving this backed out of an operation (empty selection,
    /// declined confirmation). Nothing was changed anywhere.
    #[error("operation aborted")]
    Aborted,

    /// A fixed-size binary value was built from the wrong number of bytes.
    #[error("invalid length for a fixed-size binary value")]
    BadLength,

    /// A bootstrap key was requested for a supplier that already has keys
    /// on file. The first-key path only exists for an empty record.
    #[error("the supplier already has keys on file")]
    ChainAlreadyRooted,

    /// Bad salt given to a cryptographic function.
    #[error("incorrect salt given for kdf")]
    CryptoBadSalt,

    /// Could not generate key from password
    #[error("key derivation from password failed")]
    CryptoKDFFailed,

    /// A key is missing from a crypto operation, like signing with a keypair
    /// that only has a public half.
    #[error("crypto key missing")]
    CryptoKeyMissing,

    /// An error while decoding base64.
    #[error("base64 decoding error")]
    DeserializeBase64(#[from] base64::DecodeError),

    /// An error while decoding hex.
    #[error("hex decoding error")]
    DeserializeHex,

    /// The endpoint returned a response with no body at all. Distinct from a
    /// response whose signature is bad.
    #[error("the endpoint returned an empty response")]
    EmptyResponse,

    /// A password was entered that does not re-derive the selected key.
    #[error("password does not match the selected key")]
    InvalidPassword,

    /// A response body that isn't shaped like signature-newline-payload.
    #[error("response signature framing is invalid")]
    InvalidSignatureFraming,

    /// An IO/net error
    #[error("io error {0:?}")]
    IoError(#[from] std::io::Error),

    /// An error while (de)serializing JSON.
    #[error("json serialization error")]
    Json(#[from] serde_json::Error),

    /// The named key is not on file for this supplier.
    #[error("key not found for this supplier")]
    KeyNotFound,

    /// The selected key has no salt on file, so its secret half cannot be
    /// re-derived from a password here.
    #[error("no salt on file for the selected key")]
    KeySaltMissing,

    /// The package manifest file is nowhere to be found.
    #[error("package manifest not found")]
    ManifestMissing,

    /// A master key cannot be revoked while other keys still ride on its
    /// chain of trust.
    #[error("cannot revoke a master key while other keys remain on file")]
    MasterKeyStillNeeded,

    /// A signature is absent where one is required, or fails verification.
    #[error("the given signature/public key/data combo is missing or does not verify")]
    MissingOrInvalidSignature,

    /// An operation needs a master key that can be re-derived locally (one
    /// with a salt on file) and there isn't one.
    #[error("no usable master key on file")]
    NoUsableMasterKey,

    /// An operation needs an access token for this supplier and there isn't
    /// one. Log in first.
    #[error("not authenticated for this supplier")]
    NotAuthenticated,

    /// The endpoint reported an application-level error. The message is
    /// passed through verbatim.
    #[error("the endpoint reported an error: {0}")]
    RemoteError(String),

    /// The named supplier isn't in the local table.
    #[error("supplier not found in the local table")]
    SupplierNotFound,

    /// An error while parsing or joining a url.
    #[error("url parse error")]
    UrlParse(#[from] url::ParseError),

    /// An input (so far, always a password) below the minimum we'll accept.
    #[error("input does not meet minimum strength requirements")]
    WeakInput,
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        // TODO: implement a real PartialEq. cannot derive because
        // std::io::Error et al are not eq-able.
        format!("{:?}", self) == format!("{:?}", other)
    }
}

/// Wraps `std::result::Result` around our `Error` enum
pub type Result<T> = std::result::Result<T, Error>;
