//! Operations over the BLS12-381 scalar field.
//!
//! # Acknowledgements
//!
//! _The following crates were used as a reference when implementing this crate. If code is very similar
//! to the reference, it is accompanied by a comment and link._
//!
//! * <https://github.com/celo-org/celo-threshold-bls-rs>: Operations over the BLS12-381 scalar field and Lagrange interpolation.
//! * <https://github.com/filecoin-project/blstrs> + <https://github.com/MystenLabs/fastcrypto>: Implementing operations over
//!   the BLS12-381 scalar field with <https://github.com/supranational/blst>.
//!
//! # Example
//!
//! ```rust
//! use llmq_cryptography::bls12381::primitives::{
//!     group::Scalar,
//!     ops::{sign_message, threshold_signature_recover, verify_message},
//!     poly::{self, Poly},
//! };
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! // Configure threshold
//! let mut rng = StdRng::seed_from_u64(0);
//! let t = 3;
//!
//! // Deal shares to five members identified by their identity hashes
//! let secret = poly::new_from(t as u32 - 1, &mut rng);
//! let public = Poly::commit(&secret);
//! let ids: Vec<_> = (1..=5u8).map(|i| Scalar::from_id(&[i; 32])).collect();
//!
//! // Generate partial signatures from shares
//! let message = b"hello world";
//! let partials: Vec<_> = ids
//!     .iter()
//!     .map(|id| sign_message(&secret.evaluate(id), message))
//!     .collect();
//!
//! // Recover the threshold signature
//! let threshold_sig = threshold_signature_recover(t, ids.iter().zip(partials.iter())).unwrap();
//!
//! // Verify threshold signature
//! verify_message(poly::public(&public), message, &threshold_sig).expect("signature should be valid");
//! ```

pub mod group;
pub mod ops;
pub mod poly;

use thiserror::Error;

/// Errors that can occur when working with BLS12-381 primitives.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not enough partial signatures: {0}/{1}")]
    NotEnoughPartialSignatures(usize, usize),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("no inverse")]
    NoInverse,
    #[error("mismatched lengths: {0} != {1}")]
    MismatchedLengths(usize, usize),
}
