//! The narrow doors between this crate and the outside world.
//!
//! Archive building, prompting a person, carrying bytes over a network, and
//! persisting the supplier table are all somebody else's job. The traits
//! here are the entire surface those somebodies plug into, and every
//! interactive loop in the flow code is written against them, so the whole
//! system can be driven by canned scripts in tests (or in automation) with
//! no terminal and no network anywhere in sight.

use crate::{
    error::{Error, Result},
    supplier::SupplierTable,
    wire::Request,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Builds a distributable archive from a project tree. Opaque to us: we
/// only ever read the resulting file's bytes.
pub trait ArchiveBuilder {
    fn build(&mut self, source_dir: &Path, manifest: &Path) -> Result<PathBuf>;
}

/// Asks a person things. Hidden prompts are for passwords and must not echo.
pub trait SecretInput {
    fn prompt_visible(&mut self, text: &str) -> Result<String>;
    fn prompt_hidden(&mut self, text: &str) -> Result<Zeroizing<String>>;
}

/// Carries one request and hands back the raw response body. A single
/// attempt per call: no retries, no caching, no circuit breaking.
pub trait Transport {
    fn send(&mut self, request: Request) -> Result<Vec<u8>>;
}

/// Loads and saves the supplier table. The flows mutate an in-memory table
/// and hand it back; nothing in this crate touches the disk for config.
pub trait ConfigStore {
    fn load(&mut self) -> Result<SupplierTable>;
    fn save(&mut self, table: &SupplierTable) -> Result<()>;
}

/// Ask a yes/no question. `y`/`yes` is a yes; `n`/`no`/nothing is a no;
/// anything else gets asked again.
pub fn confirm<I: SecretInput + ?Sized>(input: &mut I, prompt: &str) -> Result<bool> {
    loop {
        let answer = input.prompt_visible(prompt)?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" | "" => return Ok(false),
            _ => {}
        }
    }
}

/// Pick one of `count` options by 1-based number. An empty answer backs out
/// of the whole operation; an out-of-range or non-numeric answer gets asked
/// again.
pub fn select_index<I: SecretInput + ?Sized>(input: &mut I, prompt: &str, count: usize) -> Result<usize> {
    loop {
        let answer = input.prompt_visible(prompt)?;
        let trimmed = answer.trim();
        if trimmed.is_empty() {
            Err(Error::Aborted)?;
        }
        match trimmed.parse::<usize>() {
            Ok(choice) if choice >= 1 && choice <= count => return Ok(choice - 1),
            _ => {}
        }
    }
}

/// Hidden prompt that re-asks until it gets a non-empty answer. Used when
/// choosing a password for a brand new key, where an empty entry means
/// "oops", not "get me out of here".
pub fn prompt_new_password<I: SecretInput + ?Sized>(input: &mut I, text: &str) -> Result<Zeroizing<String>> {
    loop {
        let password = input.prompt_hidden(text)?;
        if !password.is_empty() {
            return Ok(password);
        }
    }
}

/// A canned input source. Answers come off the front of the queue; running
/// dry counts as the person backing out, which surfaces as `Aborted`.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    answers: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(answers: I) -> Self {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push<S: Into<String>>(&mut self, answer: S) {
        self.answers.push_back(answer.into());
    }

    fn next_answer(&mut self) -> Result<String> {
        self.answers.pop_front().ok_or(Error::Aborted)
    }
}

impl SecretInput for ScriptedInput {
    fn prompt_visible(&mut self, _text: &str) -> Result<String> {
        self.next_answer()
    }

    fn prompt_hidden(&mut self, _text: &str) -> Result<Zeroizing<String>> {
        self.next_answer().map(Zeroizing::new)
    }
}

/// A canned transport. Hands back queued response bodies in order and keeps
/// every request it was asked to send, for later inspection.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: VecDeque<Vec<u8>>,
    sent: Vec<Request>,
}

impl ScriptedTransport {
    pub fn new<I: IntoIterator<Item = Vec<u8>>>(responses: I) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            sent: Vec::new(),
        }
    }

    pub fn queue_response(&mut self, body: Vec<u8>) {
        self.responses.push_back(body);
    }

    /// Every request sent so far, oldest first.
    pub fn sent(&self) -> &[Request] {
        &self.sent
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, request: Request) -> Result<Vec<u8>> {
        self.sent.push(request);
        self.responses
            .pop_front()
            .ok_or_else(|| Error::IoError(std::io::Error::new(std::io::ErrorKind::Other, "no scripted response left")))
    }
}

/// A config store that keeps the table in memory.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    table: SupplierTable,
}

impl MemoryConfigStore {
    pub fn new(table: SupplierTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &SupplierTable {
        &self.table
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&mut self) -> Result<SupplierTable> {
        Ok(self.table.clone())
    }

    fn save(&mut self, table: &SupplierTable) -> Result<()> {
        self.table = table.clone();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn confirm_answers() {
        let mut input = ScriptedInput::new(["y"]);
        assert_eq!(confirm(&mut input, "so we're doing this? (y/N) ").unwrap(), true);

        let mut input = ScriptedInput::new(["YES"]);
        assert_eq!(confirm(&mut input, "(y/N) ").unwrap(), true);

        let mut input = ScriptedInput::new([""]);
        assert_eq!(confirm(&mut input, "(y/N) ").unwrap(), false);

        let mut input = ScriptedInput::new(["n"]);
        assert_eq!(confirm(&mut input, "(y/N) ").unwrap(), false);

        // gibberish gets re-asked until something parseable shows up
        let mut input = ScriptedInput::new(["maybe", "ok", "yes"]);
        assert_eq!(confirm(&mut input, "(y/N) ").unwrap(), true);
    }

    #[test]
    fn select_index_rules() {
        let mut input = ScriptedInput::new(["2"]);
        assert_eq!(select_index(&mut input, "which one? ", 3).unwrap(), 1);

        // out of range and non-numeric answers re-ask
        let mut input = ScriptedInput::new(["0", "9", "potato", "3"]);
        assert_eq!(select_index(&mut input, "which one? ", 3).unwrap(), 2);

        // empty backs out
        let mut input = ScriptedInput::new([""]);
        assert_eq!(select_index(&mut input, "which one? ", 3).err(), Some(Error::Aborted));
    }

    #[test]
    fn exhausted_script_aborts() {
        let mut input = ScriptedInput::default();
        assert_eq!(input.prompt_visible("anyone there? ").err(), Some(Error::Aborted));
        assert_eq!(confirm(&mut input, "(y/N) ").err(), Some(Error::Aborted));
    }

    #[test]
    fn new_password_skips_empty_entries() {
        let mut input = ScriptedInput::new(["", "", "swordfish"]);
        let password = prompt_new_password(&mut input, "password: ").unwrap();
        assert_eq!(password.as_str(), "swordfish");
    }

    #[test]
    fn scripted_transport_records_requests() {
        let url: url::Url = "https://sky.example/api/login".parse().unwrap();
        let mut transport = ScriptedTransport::new([b"hello".to_vec()]);
        let body = transport.send(Request::get(url.clone(), vec![])).unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(transport.sent()[0].url().as_str(), url.as_str());
        assert!(transport.send(Request::get(url, vec![])).is_err());
    }

    #[test]
    fn memory_config_store_roundtrips_the_table() {
        let mut store = MemoryConfigStore::default();
        assert!(store.load().unwrap().names().next().is_none());

        let mut table = SupplierTable::new();
        table.ensure("acme");
        store.save(&table).unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded.get("acme").is_some());
        assert_eq!(store.table().names().collect::<Vec<_>>(), vec!["acme"]);
    }
}
