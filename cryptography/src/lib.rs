//! Hash, sign, share and encrypt the key material of a quorum DKG.
//!
//! # Status
//!
//! `llmq-cryptography` implements exactly the primitives a quorum distributed key generation
//! needs (and nothing else): SHA-256 digests, BLS12-381 group and polynomial arithmetic,
//! threshold and securely-aggregated BLS signatures, share encryption (IES) and the DKG
//! contribution operations built on top of them.

pub mod bls12381;
pub mod sha256;
pub use sha256::{hash, Digest, Sha256};
