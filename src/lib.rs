//! Welcome to the Consign core, the supplier trust library behind the
//! Consign package channel.
//!
//! Everything here exists to answer one question: was this package really
//! built by the supplier whose name is on it? A supplier's secret keys
//! never exist on disk. Each signing key is re-derived on demand from a
//! password through a memory-hard kdf and thrown away after use; all that
//! is ever stored is the public half, the kdf salt, and the key's place in
//! the supplier's chain of trust. The chain starts with a master key,
//! registered bare on first contact, and every key added after that
//! carries an attestation signed by a master already on file. Revocations
//! travel the same way, so the endpoint can replay the entire history of a
//! supplier's keys from signed statements alone.
//!
//! Releases ride on top of the chain. An artifact is hashed in a stream,
//! the digest is signed, and the detached signature travels next to the
//! artifact. Anyone holding the supplier's public keys can check it, and
//! any single on-file key verifying is enough, so adding a key never
//! breaks what an older key signed.
//!
//! The library is deliberately inert at its edges. Prompting a person,
//! carrying bytes over the network, packing an archive, and persisting the
//! supplier table all happen behind traits in [host], which lets the flows
//! in [trust] and [release] be driven by a real terminal and HTTP stack or
//! by a canned script in a test, without either knowing the difference.
//!
//! The goals are as follows:
//!
//! 1. A password is the only credential a supplier ever holds on to.
//! Nothing secret is written to disk or sent over the wire, ever.
//! 1. Every key except the very first is vouched for by a key that was
//! already trusted, in a statement anyone can verify after the fact.
//! 1. A release leaves the machine only after its signature verifies
//! locally against the supplier's own key file.
//! 1. Nothing irreversible happens without a person saying so first, and
//! backing out of a prompt always leaves things exactly as they were.

pub mod error;
pub mod util;
pub mod crypto;
pub mod supplier;
pub mod wire;
pub mod host;
pub mod trust;
pub mod release;
