//! The chain of trust: how supplier keys come to exist, how new keys get
//! blessed by existing ones, and how keys are retired.
//!
//! The first key a supplier registers is a master key sent bare; the
//! endpoint takes it on first use. Every key after that (more masters,
//! day-to-day signing keys) is announced in a canonical message signed by a
//! master already on file, and revocations work the same way. The signed
//! bytes travel verbatim in the request; nothing downstream re-serializes
//! them.
//!
//! Every operation here runs prompt-first: passwords, confirmations and
//! selections all happen before anything is sent or stored, so an empty
//! answer or a declined confirmation backs the whole operation out with
//! nothing changed.

use crate::{
    crypto::{
        kdf::{self, KdfSalt},
        sign::{SignKeypair, SignKeypairPublic, SignKeypairSignature},
    },
    error::{Error, Result},
    host::{confirm, prompt_new_password, select_index, SecretInput, Transport},
    supplier::{AccessToken, KeyRole, SigningKey, Supplier, SupplierTable, TrustEndpoint},
    util::{ser::Binary, Timestamp},
    wire::{endpoint_url, open_response, Request},
};
use getset::Getters;
use rand::{CryptoRng, RngCore};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// What a key-management message announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAction {
    #[serde(rename = "CREATE")]
    Create,
    #[serde(rename = "REVOKE")]
    Revoke,
}

/// The record of intent that master keys sign: "this key now exists for
/// this supplier" or "this key is dead". Field order is part of the
/// format; the canonical serialization below is what gets signed and what
/// the endpoint re-verifies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
pub struct KeyManagementMessage {
    action: KeyAction,
    date: Timestamp,
    public_key: Binary<32>,
    supplier: String,
    key_role: KeyRole,
}

impl KeyManagementMessage {
    pub fn new(action: KeyAction, date: Timestamp, public_key: Binary<32>, supplier: String, key_role: KeyRole) -> Self {
        Self {
            action,
            date,
            public_key,
            supplier,
            key_role,
        }
    }

    /// The canonical serialized form, the exact bytes that get signed.
    pub fn canonical(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Sign the canonical form with a master keypair, producing an
    /// attestation that carries the signed bytes along with it.
    pub fn attested_by(&self, keypair: &SignKeypair) -> Result<Attestation> {
        let message = self.canonical()?;
        let signature = keypair.sign(message.as_bytes())?;
        Ok(Attestation {
            message,
            signature,
            signer_public_key: keypair.into(),
        })
    }
}

/// Proof that a master key stands behind a key-management message.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Attestation {
    /// The exact serialized message that was signed. These bytes travel
    /// verbatim; re-serializing is never good enough.
    message: String,
    signature: SignKeypairSignature,
    signer_public_key: SignKeypairPublic,
}

impl Attestation {
    pub fn new(message: String, signature: SignKeypairSignature, signer_public_key: SignKeypairPublic) -> Self {
        Self {
            message,
            signature,
            signer_public_key,
        }
    }

    /// Check the signature against the carried message and signer key.
    pub fn verify(&self) -> Result<()> {
        self.signer_public_key.verify(&self.signature, self.message.as_bytes())
    }
}

/// How far along the bootstrap a supplier's chain of trust is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Nothing on file. The only legal next step is a first master key.
    NoKeys,
    /// Exactly the root master key.
    HasMaster,
    /// The root plus at least one more key chained to it.
    HasMasterAndSubkeys,
}

impl ChainState {
    pub fn of(supplier: &Supplier) -> Self {
        if supplier.is_empty() {
            Self::NoKeys
        } else if supplier.signing_keys().len() == 1 && supplier.has_master() {
            Self::HasMaster
        } else {
            Self::HasMasterAndSubkeys
        }
    }
}

/// Everything a trust operation needs, bundled and borrowed: the key table
/// to read and mutate, the endpoint to talk to, and the host's input and
/// transport.
pub struct TrustChain<'a, I, T> {
    table: &'a mut SupplierTable,
    endpoint: &'a TrustEndpoint,
    input: &'a mut I,
    transport: &'a mut T,
}

impl<'a, I: SecretInput, T: Transport> TrustChain<'a, I, T> {
    pub fn new(table: &'a mut SupplierTable, endpoint: &'a TrustEndpoint, input: &'a mut I, transport: &'a mut T) -> Self {
        Self {
            table,
            endpoint,
            input,
            transport,
        }
    }

    /// Where a supplier currently sits in the bootstrap.
    pub fn state(&self, supplier: &str) -> ChainState {
        self.table.get(supplier).map(ChainState::of).unwrap_or(ChainState::NoKeys)
    }

    /// Register the very first key for a supplier: a master key, sent
    /// bare. Nothing on file can attest to it yet; the endpoint takes it
    /// on first use and every later key chains back to it.
    pub fn create_first_key<R: RngCore + CryptoRng>(&mut self, rng: &mut R, supplier: &str) -> Result<SigningKey> {
        let existing = self.table.get(supplier);
        if existing.map(|record| !record.is_empty()).unwrap_or(false) {
            Err(Error::ChainAlreadyRooted)?;
        }
        let token = existing
            .and_then(|record| record.token().clone())
            .ok_or(Error::NotAuthenticated)?;

        let password = prompt_new_password(&mut *self.input, "Enter a strong password for the new master key: ")?;
        let store_salt = confirm(
            &mut *self.input,
            "Store the kdf salt with the endpoint, so other machines can re-derive this key? (y/N): ",
        )?;
        let salt = KdfSalt::generate(rng);
        let created_at = Timestamp::now();
        let keypair = kdf::derive_signing_keypair(password.as_bytes(), salt.as_ref(), KeyRole::Master.derive_tier())?;
        drop(password);

        let public = SignKeypairPublic::from(&keypair);
        let message = KeyManagementMessage::new(
            KeyAction::Create,
            created_at.clone(),
            public.to_binary(),
            supplier.to_string(),
            KeyRole::Master,
        );
        let message_json = message.canonical()?;

        let record = SigningKey::new(public.to_binary(), Some(salt.clone()), KeyRole::Master, created_at.clone());
        self.table.supplier_mut(supplier)?.push_key(record.clone());

        let mut fields = vec![
            ("token".to_string(), token.to_string()),
            ("date_generated".to_string(), created_at.to_string()),
            ("message".to_string(), message_json),
            ("publickey".to_string(), public.to_hex()),
            ("type".to_string(), KeyRole::Master.as_str().to_string()),
        ];
        if store_salt {
            fields.push(("stored_salt".to_string(), salt.to_hex()));
        }
        let url = endpoint_url(self.endpoint.url(), "key/add")?;
        let body = self.transport.send(Request::post_form(url, fields))?;
        open_response(&body, self.endpoint.public_key())?.checked()?;
        info!(supplier = %supplier, public_key = %public.to_hex(), "Registered first master key");
        Ok(record)
    }

    /// Create a new key for a supplier whose chain is already rooted. The
    /// new key can be another master or a day-to-day signing key; either
    /// way, a master key already on file must attest to it.
    pub fn create_key<R: RngCore + CryptoRng>(&mut self, rng: &mut R, supplier: &str, role: KeyRole) -> Result<SigningKey> {
        let supplier_record = self.table.supplier(supplier)?;
        let token = supplier_record.token().clone().ok_or(Error::NotAuthenticated)?;
        let masters: Vec<SigningKey> = supplier_record.usable_masters().into_iter().cloned().collect();
        if masters.is_empty() {
            Err(Error::NoUsableMasterKey)?;
        }

        let password = prompt_new_password(&mut *self.input, "Enter a strong password for the new key: ")?;
        let store_salt = confirm(
            &mut *self.input,
            "Store the kdf salt with the endpoint, so other machines can re-derive this key? (y/N): ",
        )?;
        let salt = KdfSalt::generate(rng);
        let created_at = Timestamp::now();
        let keypair = kdf::derive_signing_keypair(password.as_bytes(), salt.as_ref(), role.derive_tier())?;
        drop(password);

        let public = SignKeypairPublic::from(&keypair);
        let message = KeyManagementMessage::new(
            KeyAction::Create,
            created_at.clone(),
            public.to_binary(),
            supplier.to_string(),
            role,
        );
        let master = self.pick_master(&masters)?;
        let attestation = self.attest(&master, &message)?;

        let record = SigningKey::new(public.to_binary(), Some(salt.clone()), role, created_at.clone());
        self.table.supplier_mut(supplier)?.push_key(record.clone());

        let mut fields = vec![
            ("token".to_string(), token.to_string()),
            ("date_generated".to_string(), created_at.to_string()),
            ("message".to_string(), attestation.message().clone()),
            ("publickey".to_string(), public.to_hex()),
            ("type".to_string(), role.as_str().to_string()),
        ];
        if store_salt {
            fields.push(("stored_salt".to_string(), salt.to_hex()));
        }
        fields.push(("master[public_key]".to_string(), attestation.signer_public_key().to_hex()));
        fields.push(("master[signature]".to_string(), attestation.signature().to_base64()));

        let url = endpoint_url(self.endpoint.url(), "key/add")?;
        let body = self.transport.send(Request::post_form(url, fields))?;
        open_response(&body, self.endpoint.public_key())?.checked()?;
        info!(supplier = %supplier, role = %role, public_key = %public.to_hex(), "Registered attested key");
        Ok(record)
    }

    /// Revoke a key. A master key on file signs a revocation message
    /// naming the target; the endpoint hears about it first, and only once
    /// it answers OK does the key leave the local table. Returns whether
    /// the key was removed.
    ///
    /// A usable master is load-bearing: while any other kind of key
    /// remains on file, revoking it is refused unless a second usable
    /// master is there to keep the chain alive.
    pub fn revoke_key(&mut self, supplier: &str, target_public_key: &Binary<32>) -> Result<bool> {
        let supplier_record = self.table.supplier(supplier)?;
        let token = supplier_record.token().clone().ok_or(Error::NotAuthenticated)?;
        let target = supplier_record
            .find_key(target_public_key)
            .cloned()
            .ok_or(Error::KeyNotFound)?;
        let masters: Vec<SigningKey> = supplier_record.usable_masters().into_iter().cloned().collect();
        if masters.is_empty() {
            Err(Error::NoUsableMasterKey)?;
        }
        let target_is_live_master = target.key_role() == &KeyRole::Master && target.derivable();
        if target_is_live_master {
            let other_live_masters = masters.iter().any(|key| key.public_key() != target.public_key());
            let dependents = supplier_record
                .signing_keys()
                .iter()
                .filter(|key| key.public_key() != target.public_key())
                .any(|key| !(key.key_role() == &KeyRole::Master && key.derivable()));
            if dependents && !other_live_masters {
                Err(Error::MasterKeyStillNeeded)?;
            }
        }

        let master = self.pick_master(&masters)?;
        if !confirm(&mut *self.input, "Really revoke this key? There is no undo. (y/N): ")? {
            Err(Error::Aborted)?;
        }

        let message = KeyManagementMessage::new(
            KeyAction::Revoke,
            Timestamp::now(),
            target.public_key().clone(),
            supplier.to_string(),
            *target.key_role(),
        );
        let attestation = self.attest(&master, &message)?;

        let fields = vec![
            ("token".to_string(), token.to_string()),
            ("message".to_string(), attestation.message().clone()),
            ("master[public_key]".to_string(), attestation.signer_public_key().to_hex()),
            ("master[signature]".to_string(), attestation.signature().to_base64()),
        ];
        let url = endpoint_url(self.endpoint.url(), "key/revoke")?;
        let body = self.transport.send(Request::post_form(url, fields))?;
        let response = open_response(&body, self.endpoint.public_key())?.checked()?;
        if !response.is_ok() {
            warn!(supplier = %supplier, status = ?response.status(), "Endpoint did not confirm the revocation; keeping the key");
            return Ok(false);
        }
        self.table.supplier_mut(supplier)?.remove_key(target_public_key);
        info!(supplier = %supplier, public_key = %target.public_key().to_hex(), "Key revoked");
        Ok(true)
    }

    /// Log in against the endpoint and sync the supplier record: store the
    /// token it mints and import any keys it knows about that we don't.
    pub fn login(&mut self, name: &str) -> Result<()> {
        let password = self.input.prompt_hidden("Password: ")?;
        if password.is_empty() {
            Err(Error::Aborted)?;
        }
        let fields = vec![
            ("name".to_string(), name.to_string()),
            ("password".to_string(), password.as_str().to_string()),
        ];
        drop(password);
        let url = endpoint_url(self.endpoint.url(), "login")?;
        let body = self.transport.send(Request::post_form(url, fields))?;
        let response = open_response(&body, self.endpoint.public_key())?.checked()?;
        let token = response
            .token()
            .map(AccessToken::new)
            .ok_or_else(|| Error::RemoteError("login response had no token".to_string()))?;
        let remote_keys = response.signing_keys()?;

        // A record we've never seen takes the endpoint's key list wholesale;
        // an existing one only imports unknown keys whose salt came back.
        let record = self.table.ensure(name);
        let fresh = record.is_empty() && record.token().is_none();
        record.set_token(Some(token));
        let mut imported = 0usize;
        for key in remote_keys {
            if record.find_key(key.public_key()).is_some() {
                continue;
            }
            if fresh || key.derivable() {
                record.push_key(key);
                imported += 1;
            }
        }
        info!(supplier = %name, imported = imported, "Logged in");
        Ok(())
    }

    /// One usable master: taken silently when there's no choice, picked by
    /// number when there is.
    fn pick_master(&mut self, masters: &[SigningKey]) -> Result<SigningKey> {
        if masters.len() == 1 {
            return Ok(masters[0].clone());
        }
        let mut prompt = String::from("Which master key should attest?\n");
        for (index, master) in masters.iter().enumerate() {
            prompt.push_str(&format!(
                "  {}. {} (created {})\n",
                index + 1,
                master.public_key().to_hex(),
                master.created_at()
            ));
        }
        prompt.push_str("Select a key: ");
        let index = select_index(&mut *self.input, &prompt, masters.len())?;
        Ok(masters[index].clone())
    }

    /// Ask for the master's password, re-derive, and sign. A password that
    /// derives the wrong key gets rejected and asked for again; an empty
    /// entry backs out.
    fn attest(&mut self, master: &SigningKey, message: &KeyManagementMessage) -> Result<Attestation> {
        let mut prompt = String::from("Enter the password for the master key: ");
        loop {
            let password = self.input.prompt_hidden(&prompt)?;
            if password.is_empty() {
                Err(Error::Aborted)?;
            }
            match master.derive_checked(password.as_bytes()) {
                Ok(keypair) => {
                    drop(password);
                    let attestation = message.attested_by(&keypair)?;
                    debug!(master = %master.public_key().to_hex(), "Master attestation produced");
                    return Ok(attestation);
                }
                Err(Error::InvalidPassword) => {
                    debug!("Master password did not reproduce the key on file");
                    prompt = String::from("Incorrect password. Enter the password for the master key: ");
                }
                Err(err) => Err(err)?,
            }
        }
    }
}
