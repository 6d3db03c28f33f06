//! Getting a release out the door: find the project manifest, sign the
//! built artifact with one of the supplier's keys, and hand both to the
//! endpoint.
//!
//! Three package kinds share all of this logic; only their local file
//! layout and wire name differ. The publish flow is deliberately linear
//! (version check, local verification, upload) and touches nothing remote
//! until the final multipart POST, so any early failure needs no cleanup.

use crate::{
    crypto::sign::{sign_file, verify_file_any, SignKeypairSignature},
    error::{Error, Result},
    host::{confirm, select_index, ArchiveBuilder, SecretInput, Transport},
    supplier::{SigningKey, SupplierTable, TrustEndpoint},
    wire::{endpoint_url, open_response, FilePart, Request},
};
use getset::Getters;
use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The kinds of package the endpoint distributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Cabin,
    Gadget,
    Motif,
}

impl PackageKind {
    pub const ALL: [PackageKind; 3] = [Self::Cabin, Self::Gadget, Self::Motif];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cabin => "cabin",
            Self::Gadget => "gadget",
            Self::Motif => "motif",
        }
    }

    /// Where this kind keeps its manifest, relative to the project root.
    pub fn manifest_path(&self) -> &'static str {
        match self {
            Self::Cabin => "cabin.json",
            Self::Gadget => "gadget.json",
            Self::Motif => "src/motif.json",
        }
    }

    /// The extension of the built artifact.
    pub fn artifact_extension(&self) -> &'static str {
        match self {
            Self::Cabin | Self::Gadget => "phar",
            Self::Motif => "zip",
        }
    }

    /// The multipart part name the endpoint expects the artifact under.
    pub fn part_name(&self) -> &'static str {
        match self {
            Self::Cabin | Self::Gadget => "phar",
            Self::Motif => "zip",
        }
    }
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The slice of a project manifest the release flow cares about. Whatever
/// else the file carries is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct Manifest {
    supplier: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl Manifest {
    pub fn new<S: Into<String>, N: Into<String>>(supplier: S, name: N, version: Option<String>) -> Self {
        Self {
            supplier: supplier.into(),
            name: name.into(),
            version,
        }
    }

    /// Read a kind's manifest out of a project directory.
    pub fn load(project_dir: &Path, kind: PackageKind) -> Result<Self> {
        let path = project_dir.join(kind.manifest_path());
        let raw = fs::read(&path).map_err(|_| Error::ManifestMissing)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Figure out what kind of package lives in a project directory.
    pub fn discover(project_dir: &Path) -> Result<(PackageKind, Self)> {
        for kind in PackageKind::ALL {
            if project_dir.join(kind.manifest_path()).is_file() {
                return Ok((kind, Self::load(project_dir, kind)?));
            }
        }
        Err(Error::ManifestMissing)
    }

    /// `{supplier}.{name}.{ext}`, the file name the artifact is built
    /// under and uploaded as.
    pub fn artifact_name(&self, kind: PackageKind) -> String {
        format!("{}.{}.{}", self.supplier, self.name, kind.artifact_extension())
    }

    /// Built artifacts land in the project's `dist/` directory.
    pub fn artifact_path(&self, project_dir: &Path, kind: PackageKind) -> PathBuf {
        project_dir.join("dist").join(self.artifact_name(kind))
    }

    /// The version as it travels on the wire. A manifest without one
    /// uploads an empty string.
    pub fn version_str(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }
}

/// The detached signature lives right next to the artifact.
pub fn signature_path(artifact: &Path) -> PathBuf {
    let mut os = artifact.as_os_str().to_os_string();
    os.push(".ed25519.sig");
    PathBuf::from(os)
}

/// Build the artifact for a project through the injected archive packer.
/// The packer owns the file format; we only care where the file landed.
pub fn build_artifact<B: ArchiveBuilder>(builder: &mut B, project_dir: &Path, kind: PackageKind) -> Result<PathBuf> {
    let manifest = project_dir.join(kind.manifest_path());
    if !manifest.is_file() {
        Err(Error::ManifestMissing)?;
    }
    builder.build(project_dir, &manifest)
}

/// Sequences one release end to end. Holds the supplier table read-only:
/// releasing never changes what keys exist.
pub struct ReleaseCoordinator<'a, I, T> {
    table: &'a SupplierTable,
    endpoint: &'a TrustEndpoint,
    input: &'a mut I,
    transport: &'a mut T,
}

impl<'a, I: SecretInput, T: Transport> ReleaseCoordinator<'a, I, T> {
    pub fn new(table: &'a SupplierTable, endpoint: &'a TrustEndpoint, input: &'a mut I, transport: &'a mut T) -> Self {
        Self {
            table,
            endpoint,
            input,
            transport,
        }
    }

    /// Sign a built artifact with one of the supplier's keys, writing the
    /// detached signature next to it and returning its path. Day-to-day
    /// signing keys are offered by default; master keys only when the
    /// caller opts in. A wrong password is a hard stop, not a retry.
    pub fn sign_artifact(&mut self, supplier: &str, artifact: &Path, include_masters: bool) -> Result<PathBuf> {
        let supplier_record = self.table.supplier(supplier)?;
        let candidates: Vec<SigningKey> = supplier_record
            .release_signing_keys(include_masters)
            .into_iter()
            .cloned()
            .collect();
        if candidates.is_empty() {
            Err(Error::KeyNotFound)?;
        }
        let key = self.pick_signing_key(&candidates)?;
        if !key.derivable() {
            Err(Error::KeySaltMissing)?;
        }

        let password = self.input.prompt_hidden("Enter the password for the signing key: ")?;
        if password.is_empty() {
            Err(Error::Aborted)?;
        }
        let keypair = key.derive_checked(password.as_bytes())?;
        drop(password);

        let signature = sign_file(artifact, &keypair)?;
        let sig_path = signature_path(artifact);
        fs::write(&sig_path, signature.to_base64().as_bytes())?;
        info!(supplier = %supplier, artifact = %artifact.display(), "Wrote detached signature");
        Ok(sig_path)
    }

    /// Check an artifact's detached signature against every key on file
    /// for the supplier. Any single key verifying is enough; a bad
    /// signature is a `false`, not an error.
    pub fn verify_artifact(&self, supplier: &str, artifact: &Path) -> Result<bool> {
        let supplier_record = self.table.supplier(supplier)?;
        let sig_path = signature_path(artifact);
        let raw = fs::read_to_string(&sig_path).map_err(|_| Error::MissingOrInvalidSignature)?;
        let signature =
            SignKeypairSignature::from_base64(raw.trim_end()).map_err(|_| Error::MissingOrInvalidSignature)?;
        verify_file_any(artifact, &supplier_record.verification_keys(), &signature)
    }

    /// The whole dance: version check, local signature verification, then
    /// the upload. Each step has to pass before the next one runs, and
    /// nothing remote changes until the upload itself.
    pub fn publish(&mut self, project_dir: &Path, kind: PackageKind) -> Result<()> {
        let manifest = Manifest::load(project_dir, kind)?;
        let supplier_record = self.table.supplier(manifest.supplier())?;
        let token = supplier_record.token().clone().ok_or(Error::NotAuthenticated)?;

        // re-publishing the version already on record needs an explicit yes
        let version_url = endpoint_url(
            self.endpoint.url(),
            &format!("package/{}/{}/version", manifest.supplier(), manifest.name()),
        )?;
        let fields = vec![
            ("type".to_string(), kind.as_str().to_string()),
            ("token".to_string(), token.to_string()),
        ];
        let body = self.transport.send(Request::post_form(version_url, fields))?;
        let response = open_response(&body, self.endpoint.public_key())?.checked()?;
        match response.latest_version() {
            Some(latest) if latest == manifest.version_str() => {
                let push_anyway = confirm(
                    &mut *self.input,
                    &format!(
                        "Version {} is already the latest on record. Push a new release anyway? (y/N): ",
                        latest
                    ),
                )?;
                if !push_anyway {
                    Err(Error::Aborted)?;
                }
            }
            latest => debug!(supplier = %manifest.supplier(), latest = ?latest, "Version check passed"),
        }

        // nothing unsigned or mis-signed leaves the machine
        let artifact = manifest.artifact_path(project_dir, kind);
        if !self.verify_artifact(manifest.supplier(), &artifact)? {
            Err(Error::MissingOrInvalidSignature)?;
        }

        let artifact_name = manifest.artifact_name(kind);
        let signature_name = format!("{}.ed25519.sig", artifact_name);
        let fields = vec![
            ("token".to_string(), token.to_string()),
            ("supplier".to_string(), manifest.supplier().clone()),
            ("package".to_string(), manifest.name().clone()),
            ("version".to_string(), manifest.version_str().to_string()),
            ("type".to_string(), kind.as_str().to_string()),
        ];
        let parts = vec![
            FilePart::new(kind.part_name(), artifact_name, artifact.clone()),
            FilePart::new("signature", signature_name, signature_path(&artifact)),
        ];
        let upload_url = endpoint_url(self.endpoint.url(), "upload")?;
        let body = self.transport.send(Request::post_multipart(upload_url, fields, parts))?;
        open_response(&body, self.endpoint.public_key())?.checked()?;
        info!(
            supplier = %manifest.supplier(),
            package = %manifest.name(),
            version = %manifest.version_str(),
            kind = %kind,
            "Release uploaded"
        );
        Ok(())
    }

    fn pick_signing_key(&mut self, keys: &[SigningKey]) -> Result<SigningKey> {
        if keys.len() == 1 {
            return Ok(keys[0].clone());
        }
        let mut prompt = String::from("More than one key can sign this release.\n");
        for (index, key) in keys.iter().enumerate() {
            prompt.push_str(&format!(
                "  {}. {} ({})\n",
                index + 1,
                key.public_key().to_hex(),
                key.key_role()
            ));
        }
        prompt.push_str("Select a key: ");
        let index = select_index(&mut *self.input, &prompt, keys.len())?;
        Ok(keys[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::{
            kdf::{self, KdfSalt},
            sign::{SignKeypair, SignKeypairPublic},
        },
        host::{ScriptedInput, ScriptedTransport},
        supplier::{tests::test_key, AccessToken, KeyRole},
        trust::{
            tests::{endpoint_pair, sealed_json, MASTER_PASSWORD},
            ChainState, TrustChain,
        },
        util::{ser::Binary, test},
    };
    use serde_json::json;
    use std::sync::OnceLock;

    const SIGNING_PASSWORD: &str = "cleared for departure";

    /// Same trick as the master fixture: one moderate-tier derive, shared.
    fn signing_key_material() -> &'static (KdfSalt, Binary<32>) {
        static CACHE: OnceLock<(KdfSalt, Binary<32>)> = OnceLock::new();
        CACHE.get_or_init(|| {
            let salt = KdfSalt::new([31u8; 16]);
            let keypair = kdf::derive_signing_keypair(
                SIGNING_PASSWORD.as_bytes(),
                salt.as_ref(),
                KeyRole::Signing.derive_tier(),
            )
            .unwrap();
            (salt, SignKeypairPublic::from(&keypair).to_binary())
        })
    }

    fn live_signing_key() -> SigningKey {
        let (salt, public) = signing_key_material();
        SigningKey::new(
            public.clone(),
            Some(salt.clone()),
            KeyRole::Signing,
            "2024-03-02T10:00:00".parse().unwrap(),
        )
    }

    fn project_with_artifact(kind: PackageKind) -> (tempfile::TempDir, PathBuf) {
        let project = tempfile::tempdir().unwrap();
        let manifest_path = project.path().join(kind.manifest_path());
        if let Some(parent) = manifest_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(
            &manifest_path,
            br#"{"supplier": "acme", "name": "widget", "version": "1.0.0"}"#,
        )
        .unwrap();
        std::fs::create_dir_all(project.path().join("dist")).unwrap();
        let manifest = Manifest::load(project.path(), kind).unwrap();
        let artifact = manifest.artifact_path(project.path(), kind);
        std::fs::write(&artifact, b"a parcel of highly artisanal bytes").unwrap();
        (project, artifact)
    }

    fn table_with(name: &str, keys: Vec<SigningKey>) -> SupplierTable {
        let mut table = SupplierTable::new();
        let record = table.ensure(name);
        record.set_token(Some(AccessToken::new("tok-123")));
        for key in keys {
            record.push_key(key);
        }
        table
    }

    #[test]
    fn manifests_live_where_their_kind_says() {
        let (project, artifact) = project_with_artifact(PackageKind::Motif);
        let (kind, manifest) = Manifest::discover(project.path()).unwrap();
        assert_eq!(kind, PackageKind::Motif);
        assert_eq!(manifest.supplier(), "acme");
        assert_eq!(manifest.name(), "widget");
        assert_eq!(manifest.version_str(), "1.0.0");
        assert!(artifact.ends_with("dist/acme.widget.zip"));

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(Manifest::discover(empty.path()).unwrap_err(), Error::ManifestMissing);

        // a version-less manifest travels as the empty string
        let unversioned = Manifest::new("acme", "widget", None);
        assert_eq!(unversioned.version_str(), "");
        assert_eq!(unversioned.artifact_name(PackageKind::Cabin), "acme.widget.phar");
    }

    #[test]
    fn building_goes_through_the_injected_packer() {
        struct Packer;
        impl ArchiveBuilder for Packer {
            fn build(&mut self, source_dir: &Path, manifest: &Path) -> Result<PathBuf> {
                assert!(manifest.ends_with("gadget.json"));
                let out = source_dir.join("dist").join("out.phar");
                std::fs::write(&out, b"a fresh archive, still warm")?;
                Ok(out)
            }
        }

        let (project, _artifact) = project_with_artifact(PackageKind::Gadget);
        let built = build_artifact(&mut Packer, project.path(), PackageKind::Gadget).unwrap();
        assert!(built.ends_with("out.phar"));
        assert!(built.is_file());

        // no manifest, no build; the packer is never consulted
        let empty = tempfile::tempdir().unwrap();
        assert_eq!(
            build_artifact(&mut Packer, empty.path(), PackageKind::Gadget).unwrap_err(),
            Error::ManifestMissing
        );
    }

    #[test]
    fn signing_writes_a_detached_signature() {
        let mut rng = test::rng();
        let (endpoint, _) = endpoint_pair(&mut rng);
        let (_project, artifact) = project_with_artifact(PackageKind::Gadget);
        let table = table_with("acme", vec![live_signing_key()]);
        let mut input = ScriptedInput::new([SIGNING_PASSWORD]);
        let mut transport = ScriptedTransport::new(Vec::new());
        let mut coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);

        let sig_path = coordinator.sign_artifact("acme", &artifact, false).unwrap();
        assert!(sig_path.ends_with("acme.widget.phar.ed25519.sig"));
        let written = std::fs::read_to_string(&sig_path).unwrap();
        assert_eq!(written.len(), 88);
        assert!(coordinator.verify_artifact("acme", &artifact).unwrap());

        // growing the artifact after the fact kills the signature
        let mut tampered = std::fs::read(&artifact).unwrap();
        tampered.push(0x00);
        std::fs::write(&artifact, &tampered).unwrap();
        assert!(!coordinator.verify_artifact("acme", &artifact).unwrap());
    }

    #[test]
    fn a_wrong_signing_password_is_a_hard_stop() {
        let mut rng = test::rng();
        let (endpoint, _) = endpoint_pair(&mut rng);
        let (_project, artifact) = project_with_artifact(PackageKind::Gadget);
        let table = table_with("acme", vec![live_signing_key()]);
        let mut input = ScriptedInput::new(["not even close"]);
        let mut transport = ScriptedTransport::new(Vec::new());
        let mut coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);

        assert_eq!(
            coordinator.sign_artifact("acme", &artifact, false).unwrap_err(),
            Error::InvalidPassword
        );
        assert!(!signature_path(&artifact).exists());
    }

    #[test]
    fn signing_needs_the_selected_keys_salt() {
        let mut rng = test::rng();
        let (endpoint, _) = endpoint_pair(&mut rng);
        let (_project, artifact) = project_with_artifact(PackageKind::Gadget);
        let table = table_with("acme", vec![test_key(&mut rng, KeyRole::Signing, false)]);
        let mut input = ScriptedInput::new(Vec::<String>::new());
        let mut transport = ScriptedTransport::new(Vec::new());
        let mut coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);

        assert_eq!(
            coordinator.sign_artifact("acme", &artifact, false).unwrap_err(),
            Error::KeySaltMissing
        );

        // and with no signing keys at all there is nothing to offer
        let table = table_with("acme", vec![test_key(&mut rng, KeyRole::Master, true)]);
        let mut coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);
        assert_eq!(
            coordinator.sign_artifact("acme", &artifact, false).unwrap_err(),
            Error::KeyNotFound
        );
    }

    #[test]
    fn verification_needs_the_signature_file() {
        let mut rng = test::rng();
        let (endpoint, _) = endpoint_pair(&mut rng);
        let (_project, artifact) = project_with_artifact(PackageKind::Gadget);
        let table = table_with("acme", vec![test_key(&mut rng, KeyRole::Signing, true)]);
        let mut input = ScriptedInput::new(Vec::<String>::new());
        let mut transport = ScriptedTransport::new(Vec::new());
        let coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);

        assert_eq!(
            coordinator.verify_artifact("acme", &artifact).unwrap_err(),
            Error::MissingOrInvalidSignature
        );
        std::fs::write(signature_path(&artifact), b"this is not a signature").unwrap();
        assert_eq!(
            coordinator.verify_artifact("acme", &artifact).unwrap_err(),
            Error::MissingOrInvalidSignature
        );
    }

    #[test]
    fn publish_aborts_when_the_version_is_taken_and_declined() {
        let mut rng = test::rng();
        let (endpoint, endpoint_keypair) = endpoint_pair(&mut rng);
        let (project, _artifact) = project_with_artifact(PackageKind::Gadget);
        let table = table_with("acme", vec![test_key(&mut rng, KeyRole::Signing, true)]);
        let mut input = ScriptedInput::new(["n"]);
        let mut transport =
            ScriptedTransport::new([sealed_json(&endpoint_keypair, json!({"latest": "1.0.0"}))]);
        let mut coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);

        assert_eq!(
            coordinator.publish(project.path(), PackageKind::Gadget).unwrap_err(),
            Error::Aborted
        );
        // only the version check went out
        assert_eq!(transport.sent().len(), 1);
        let sent = &transport.sent()[0];
        assert!(sent.url().as_str().ends_with("/api/package/acme/widget/version"));
        assert_eq!(sent.field("type"), Some("gadget"));
        assert_eq!(sent.field("token"), Some("tok-123"));
    }

    #[test]
    fn publish_refuses_an_artifact_nobody_on_file_signed() {
        let mut rng = test::rng();
        let (endpoint, endpoint_keypair) = endpoint_pair(&mut rng);
        let (project, artifact) = project_with_artifact(PackageKind::Gadget);
        // signed, but by a key the supplier record has never heard of
        let stranger = SignKeypair::new_ed25519(&mut rng);
        let signature = sign_file(&artifact, &stranger).unwrap();
        std::fs::write(signature_path(&artifact), signature.to_base64().as_bytes()).unwrap();

        let table = table_with("acme", vec![test_key(&mut rng, KeyRole::Signing, true)]);
        let mut input = ScriptedInput::new(Vec::<String>::new());
        let mut transport = ScriptedTransport::new([sealed_json(&endpoint_keypair, json!({}))]);
        let mut coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);

        assert_eq!(
            coordinator.publish(project.path(), PackageKind::Gadget).unwrap_err(),
            Error::MissingOrInvalidSignature
        );
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn publish_uploads_artifact_and_signature() {
        let mut rng = test::rng();
        let (endpoint, endpoint_keypair) = endpoint_pair(&mut rng);
        let (project, artifact) = project_with_artifact(PackageKind::Motif);

        let signer = SignKeypair::new_ed25519(&mut rng);
        let signature = sign_file(&artifact, &signer).unwrap();
        std::fs::write(signature_path(&artifact), signature.to_base64().as_bytes()).unwrap();
        let record = SigningKey::new(
            SignKeypairPublic::from(&signer).to_binary(),
            None,
            KeyRole::Signing,
            "2024-03-02T10:00:00".parse().unwrap(),
        );

        let table = table_with("acme", vec![record]);
        let mut input = ScriptedInput::new(Vec::<String>::new());
        let mut transport = ScriptedTransport::new([
            sealed_json(&endpoint_keypair, json!({"latest": "0.9.9"})),
            sealed_json(&endpoint_keypair, json!({"status": "OK"})),
        ]);
        let mut coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);

        coordinator.publish(project.path(), PackageKind::Motif).unwrap();
        assert_eq!(transport.sent().len(), 2);
        let upload = &transport.sent()[1];
        assert!(upload.url().as_str().ends_with("/api/upload"));
        assert_eq!(upload.field("token"), Some("tok-123"));
        assert_eq!(upload.field("supplier"), Some("acme"));
        assert_eq!(upload.field("package"), Some("widget"));
        assert_eq!(upload.field("version"), Some("1.0.0"));
        assert_eq!(upload.field("type"), Some("motif"));
        match upload {
            Request::PostMultipart { parts, .. } => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0].name, "zip");
                assert_eq!(parts[0].file_name, "acme.widget.zip");
                assert_eq!(parts[0].path, artifact);
                assert_eq!(parts[1].name, "signature");
                assert_eq!(parts[1].file_name, "acme.widget.zip.ed25519.sig");
                assert_eq!(parts[1].path, signature_path(&artifact));
            }
            other => panic!("expected a multipart upload, got {:?}", other),
        }
    }

    #[test]
    fn publish_passes_remote_errors_through() {
        let mut rng = test::rng();
        let (endpoint, endpoint_keypair) = endpoint_pair(&mut rng);
        let (project, artifact) = project_with_artifact(PackageKind::Gadget);

        let signer = SignKeypair::new_ed25519(&mut rng);
        let signature = sign_file(&artifact, &signer).unwrap();
        std::fs::write(signature_path(&artifact), signature.to_base64().as_bytes()).unwrap();
        let record = SigningKey::new(
            SignKeypairPublic::from(&signer).to_binary(),
            None,
            KeyRole::Signing,
            "2024-03-02T10:00:00".parse().unwrap(),
        );

        let table = table_with("acme", vec![record]);
        let mut input = ScriptedInput::new(Vec::<String>::new());
        let mut transport = ScriptedTransport::new([
            sealed_json(&endpoint_keypair, json!({})),
            sealed_json(&endpoint_keypair, json!({"error": "quota exceeded"})),
        ]);
        let mut coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);

        assert_eq!(
            coordinator.publish(project.path(), PackageKind::Gadget).unwrap_err(),
            Error::RemoteError("quota exceeded".to_string())
        );
    }

    #[test]
    fn a_release_rides_the_whole_chain() {
        let mut rng = test::rng();
        let (endpoint, endpoint_keypair) = endpoint_pair(&mut rng);
        let (project, artifact) = project_with_artifact(PackageKind::Gadget);

        let mut table = SupplierTable::new();
        let mut input = ScriptedInput::new(["a perfectly serviceable login password"]);
        let mut transport = ScriptedTransport::new([sealed_json(
            &endpoint_keypair,
            json!({"status": "OK", "token": "tok-acme", "signing_keys": []}),
        )]);

        // log in, then bootstrap the chain with a master key
        let mut chain = TrustChain::new(&mut table, &endpoint, &mut input, &mut transport);
        chain.login("acme").unwrap();
        assert_eq!(chain.state("acme"), ChainState::NoKeys);

        input.push(MASTER_PASSWORD);
        input.push("y");
        transport.queue_response(sealed_json(&endpoint_keypair, json!({"status": "OK"})));
        let mut chain = TrustChain::new(&mut table, &endpoint, &mut input, &mut transport);
        chain.create_first_key(&mut rng, "acme").unwrap();
        assert_eq!(chain.state("acme"), ChainState::HasMaster);

        // a signing key attested by the master
        input.push(SIGNING_PASSWORD);
        input.push("y");
        input.push(MASTER_PASSWORD);
        transport.queue_response(sealed_json(&endpoint_keypair, json!({"status": "OK"})));
        let mut chain = TrustChain::new(&mut table, &endpoint, &mut input, &mut transport);
        let signing = chain.create_key(&mut rng, "acme", KeyRole::Signing).unwrap();
        assert_eq!(chain.state("acme"), ChainState::HasMasterAndSubkeys);

        // sign and verify the artifact with the fresh signing key
        input.push(SIGNING_PASSWORD);
        let mut coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);
        coordinator.sign_artifact("acme", &artifact, false).unwrap();
        assert!(coordinator.verify_artifact("acme", &artifact).unwrap());

        // ship it
        transport.queue_response(sealed_json(&endpoint_keypair, json!({"latest": "0.2.0"})));
        transport.queue_response(sealed_json(&endpoint_keypair, json!({"status": "OK"})));
        let mut coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);
        coordinator.publish(project.path(), PackageKind::Gadget).unwrap();

        // revoke the signing key; its old signature dies with it because
        // no remaining key ever signed this artifact
        input.push("y");
        input.push(MASTER_PASSWORD);
        transport.queue_response(sealed_json(&endpoint_keypair, json!({"status": "OK"})));
        let mut chain = TrustChain::new(&mut table, &endpoint, &mut input, &mut transport);
        assert!(chain.revoke_key("acme", signing.public_key()).unwrap());

        let coordinator = ReleaseCoordinator::new(&table, &endpoint, &mut input, &mut transport);
        assert!(!coordinator.verify_artifact("acme", &artifact).unwrap());
    }
}
