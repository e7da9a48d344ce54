//! Threshold BLS over the BLS12-381 curve, as used by quorum distributed key generation.
//!
//! Public keys live in G1 (48 bytes compressed) and signatures in G2 (96 bytes compressed).
//! Quorum members are identified by scalars derived from their identity hash, so shares and
//! signatures are evaluated and interpolated at arbitrary field points rather than at small
//! integer indices.
//!
//! # Features
//!
//! This crate has the following features:
//!
//! - `portable`: Enables `portable` feature on `blst` (<https://github.com/supranational/blst?tab=readme-ov-file#platform-and-language-compatibility>).

pub mod dkg;
pub mod ies;
pub mod primitives;
