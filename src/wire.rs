//! The wire format for talking to a trust endpoint.
//!
//! Requests go out as abstract descriptions (query GET, form POST, or
//! multipart POST with file parts) for an injected transport to carry; we
//! never speak HTTP ourselves. Responses come back authenticated: every
//! body is an 88-character base64url signature, one newline, then a JSON
//! payload, and the signature must verify over the payload bytes with the
//! endpoint key configured out of band. A key advertised inside a payload
//! is never used for verification.

use crate::{
    crypto::sign::{SignKeypair, SignKeypairPublic, SignKeypairSignature},
    error::{Error, Result},
    supplier::SigningKey,
};
use getset::Getters;
use std::path::PathBuf;
use url::Url;

/// Length of a base64url-padded ed25519 signature, the fixed-width first
/// field of every signed response body.
pub const SIGNATURE_B64_LEN: usize = 88;

/// A named file to attach to a multipart request.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    /// The part name the endpoint expects (the artifact kind, or
    /// "signature").
    pub name: String,
    /// The file name presented alongside the bytes.
    pub file_name: String,
    /// Where the bytes live on disk.
    pub path: PathBuf,
}

impl FilePart {
    pub fn new<N: Into<String>, F: Into<String>, P: Into<PathBuf>>(name: N, file_name: F, path: P) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            path: path.into(),
        }
    }
}

/// One outbound request, described abstractly. The injected transport turns
/// this into an actual network call, once, with no retries.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Fetch with key/value query parameters.
    Get { url: Url, query: Vec<(String, String)> },
    /// A form-encoded POST.
    PostForm { url: Url, fields: Vec<(String, String)> },
    /// A multipart POST carrying files next to scalar fields.
    PostMultipart {
        url: Url,
        fields: Vec<(String, String)>,
        parts: Vec<FilePart>,
    },
}

impl Request {
    pub fn get(url: Url, query: Vec<(String, String)>) -> Self {
        Self::Get { url, query }
    }

    pub fn post_form(url: Url, fields: Vec<(String, String)>) -> Self {
        Self::PostForm { url, fields }
    }

    pub fn post_multipart(url: Url, fields: Vec<(String, String)>, parts: Vec<FilePart>) -> Self {
        Self::PostMultipart { url, fields, parts }
    }

    /// The url this request is headed for.
    pub fn url(&self) -> &Url {
        match self {
            Self::Get { url, .. } => url,
            Self::PostForm { url, .. } => url,
            Self::PostMultipart { url, .. } => url,
        }
    }

    /// A scalar field by name, wherever it lives in the request.
    pub fn field(&self, name: &str) -> Option<&str> {
        let fields = match self {
            Self::Get { query, .. } => query,
            Self::PostForm { fields, .. } => fields,
            Self::PostMultipart { fields, .. } => fields,
        };
        fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Join a request path onto the endpoint's base url. Tolerates a base with
/// or without a trailing slash.
pub fn endpoint_url(base: &Url, path: &str) -> Result<Url> {
    if base.path().ends_with('/') {
        Ok(base.join(path)?)
    } else {
        let mut with_slash = base.clone();
        with_slash.set_path(&format!("{}/", base.path()));
        Ok(with_slash.join(path)?)
    }
}

/// The authenticated envelope every response arrives in.
///
/// Decoding is strict and staged: an empty body is its own condition
/// (`EmptyResponse`), a body whose 89th byte is not the newline delimiter
/// (or that is too short to have one, or whose signature block isn't real
/// base64) is a framing violation, and only a well-framed body proceeds to
/// signature verification over the payload bytes after the newline.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct SignedEnvelope {
    /// The signature over the payload bytes.
    signature: SignKeypairSignature,
    /// The raw payload bytes (a JSON document, but nobody's checked yet).
    payload: Vec<u8>,
}

impl SignedEnvelope {
    /// Parse and authenticate a raw response body against the endpoint key.
    pub fn open(body: &[u8], remote_key: &SignKeypairPublic) -> Result<Self> {
        if body.is_empty() {
            Err(Error::EmptyResponse)?;
        }
        if body.len() <= SIGNATURE_B64_LEN || body[SIGNATURE_B64_LEN] != b'\n' {
            Err(Error::InvalidSignatureFraming)?;
        }
        let sig_str = std::str::from_utf8(&body[0..SIGNATURE_B64_LEN]).map_err(|_| Error::InvalidSignatureFraming)?;
        let signature = SignKeypairSignature::from_base64(sig_str).map_err(|_| Error::InvalidSignatureFraming)?;
        let payload = body[SIGNATURE_B64_LEN + 1..].to_vec();
        remote_key.verify(&signature, &payload)?;
        Ok(Self { signature, payload })
    }

    /// The inverse of [open][SignedEnvelope::open]: sign a payload and frame
    /// it up. We only ever consume envelopes; this exists for responder
    /// implementations and for tests standing in for one.
    pub fn seal(payload: &[u8], keypair: &SignKeypair) -> Result<Vec<u8>> {
        let signature = keypair.sign(payload)?;
        let mut body = signature.to_base64().into_bytes();
        body.push(b'\n');
        body.extend_from_slice(payload);
        Ok(body)
    }
}

/// The decoded JSON payload of a response, with accessors for the handful
/// of fields the flows actually look at.
#[derive(Debug, Clone, PartialEq)]
pub struct Response(serde_json::Value);

impl Response {
    pub fn from_envelope(envelope: &SignedEnvelope) -> Result<Self> {
        Ok(Self(serde_json::from_slice(envelope.payload())?))
    }

    /// The application-level error message, if the endpoint sent one.
    pub fn error(&self) -> Option<&str> {
        self.0.get("error").and_then(|value| value.as_str())
    }

    /// Accepted mutations come back with status "OK".
    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(|value| value.as_str())
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Some("OK")
    }

    /// The latest published version, from a version check.
    pub fn latest_version(&self) -> Option<&str> {
        self.0.get("latest").and_then(|value| value.as_str())
    }

    /// The access token minted by a login.
    pub fn token(&self) -> Option<&str> {
        self.0.get("token").and_then(|value| value.as_str())
    }

    /// Key records the endpoint holds for us, from a login. Empty when the
    /// field is absent.
    pub fn signing_keys(&self) -> Result<Vec<SigningKey>> {
        match self.0.get("signing_keys") {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(Vec::new()),
        }
    }

    /// Raw access for anything else.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    /// Pass through, unless the endpoint reported an error, in which case
    /// carry its message verbatim.
    pub fn checked(self) -> Result<Self> {
        if let Some(message) = self.error() {
            Err(Error::RemoteError(message.to_string()))?;
        }
        Ok(self)
    }
}

/// Open a signed response body and parse its payload in one move.
pub fn open_response(body: &[u8], remote_key: &SignKeypairPublic) -> Result<Response> {
    let envelope = SignedEnvelope::open(body, remote_key)?;
    Response::from_envelope(&envelope)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn endpoint_keys() -> (SignKeypair, SignKeypairPublic) {
        let mut rng = crate::util::test::rng();
        let keypair = SignKeypair::new_ed25519(&mut rng);
        let public = SignKeypairPublic::from(&keypair);
        (keypair, public)
    }

    #[test]
    fn envelope_roundtrip() {
        let (keypair, public) = endpoint_keys();
        let payload = br#"{"status":"OK","latest":"1.2.3"}"#;
        let body = SignedEnvelope::seal(payload, &keypair).unwrap();

        assert_eq!(body[SIGNATURE_B64_LEN], b'\n');
        let envelope = SignedEnvelope::open(&body, &public).unwrap();
        assert_eq!(envelope.payload().as_slice(), payload.as_slice());

        let response = Response::from_envelope(&envelope).unwrap();
        assert!(response.is_ok());
        assert_eq!(response.latest_version(), Some("1.2.3"));
        assert_eq!(response.error(), None);
    }

    #[test]
    fn envelope_empty_body_is_its_own_thing() {
        let (_, public) = endpoint_keys();
        assert_eq!(SignedEnvelope::open(b"", &public).err(), Some(Error::EmptyResponse));
    }

    #[test]
    fn envelope_framing_violations() {
        let (keypair, public) = endpoint_keys();
        let mut body = SignedEnvelope::seal(br#"{"status":"OK"}"#, &keypair).unwrap();

        // stomp the delimiter
        body[SIGNATURE_B64_LEN] = b' ';
        assert_eq!(SignedEnvelope::open(&body, &public).err(), Some(Error::InvalidSignatureFraming));

        // too short to even hold a signature
        assert_eq!(SignedEnvelope::open(b"abc", &public).err(), Some(Error::InvalidSignatureFraming));

        // delimiter present but the signature block is not base64
        let mut garbage = vec![b'*'; SIGNATURE_B64_LEN];
        garbage.push(b'\n');
        garbage.extend_from_slice(br#"{"status":"OK"}"#);
        assert_eq!(SignedEnvelope::open(&garbage, &public).err(), Some(Error::InvalidSignatureFraming));

        // exactly 88 bytes, no delimiter at all
        let stub = vec![b'A'; SIGNATURE_B64_LEN];
        assert_eq!(SignedEnvelope::open(&stub, &public).err(), Some(Error::InvalidSignatureFraming));
    }

    #[test]
    fn envelope_rejects_wrong_key_and_tampering() {
        let (keypair, _) = endpoint_keys();
        let mut rng = crate::util::test::rng();
        let _ = SignKeypair::new_ed25519(&mut rng);
        let imposter = SignKeypairPublic::from(&SignKeypair::new_ed25519(&mut rng));

        let body = SignedEnvelope::seal(br#"{"status":"OK"}"#, &keypair).unwrap();
        assert_eq!(SignedEnvelope::open(&body, &imposter).err(), Some(Error::MissingOrInvalidSignature));

        let public = SignKeypairPublic::from(&keypair);
        let mut tampered = body.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        assert_eq!(SignedEnvelope::open(&tampered, &public).err(), Some(Error::MissingOrInvalidSignature));
    }

    #[test]
    fn response_error_passthrough() {
        let (keypair, public) = endpoint_keys();
        let body = SignedEnvelope::seal(br#"{"error":"no such package"}"#, &keypair).unwrap();
        let response = open_response(&body, &public).unwrap();
        assert_eq!(response.error(), Some("no such package"));
        assert_eq!(response.checked().err(), Some(Error::RemoteError("no such package".into())));
    }

    #[test]
    fn endpoint_url_joining() {
        let with_slash: Url = "https://sky.example/api/".parse().unwrap();
        let without: Url = "https://sky.example/api".parse().unwrap();
        assert_eq!(endpoint_url(&with_slash, "key/add").unwrap().as_str(), "https://sky.example/api/key/add");
        assert_eq!(endpoint_url(&without, "key/add").unwrap().as_str(), "https://sky.example/api/key/add");
        assert_eq!(
            endpoint_url(&with_slash, "package/acme/widget/version").unwrap().as_str(),
            "https://sky.example/api/package/acme/widget/version"
        );
    }

    #[test]
    fn request_field_lookup() {
        let url: Url = "https://sky.example/api/login".parse().unwrap();
        let request = Request::post_form(url, vec![("name".into(), "acme".into()), ("password".into(), "hunter2".into())]);
        assert_eq!(request.field("name"), Some("acme"));
        assert_eq!(request.field("password"), Some("hunter2"));
        assert_eq!(request.field("absent"), None);
    }
}
