//! Digital signatures over the BLS12-381 curve.
//!
//! Signatures are produced over 32-byte message digests. Members sign with their operator key
//! (plain BLS) and with their share of the quorum key (threshold BLS). Operator signatures over
//! the same digest are combined with secure aggregation, which weighs every signature by a
//! coefficient derived from the full signer set so that no signer can choose its key to cancel
//! out the keys of others.

use super::{
    group::{self, equal, Element, Point, Scalar, G2},
    poly::{self, Poly},
    Error,
};
use crate::Sha256;
use llmq_codec::Encode;
use rand::RngCore;
use rayon::prelude::*;

/// Returns a new keypair derived from the provided randomness.
pub fn keypair<R: RngCore>(rng: &mut R) -> (group::Private, group::Public) {
    let private = group::Private::rand(rng);
    (private, compute_public(&private))
}

/// Returns the public key corresponding to the provided private key.
pub fn compute_public(private: &group::Private) -> group::Public {
    let mut public = group::Public::one();
    public.mul(private);
    public
}

/// Hashes the provided message to G2.
pub fn hash_message(message: &[u8]) -> G2 {
    let mut hm = G2::zero();
    hm.map(message);
    hm
}

/// Signs the provided message with the private key.
pub fn sign_message(private: &group::Private, message: &[u8]) -> group::Signature {
    let mut s = hash_message(message);
    s.mul(private);
    s
}

/// Verifies the signature with the provided public key.
pub fn verify_message(
    public: &group::Public,
    message: &[u8],
    signature: &group::Signature,
) -> Result<(), Error> {
    let hm = hash_message(message);
    if !equal(public, signature, &hm) {
        return Err(Error::InvalidSignature);
    }
    Ok(())
}

/// Derives the public key share of member `id` from a public polynomial.
pub fn public_key_share(public: &poly::Public, id: &Scalar) -> group::Public {
    public.evaluate(id)
}

/// Aggregates multiple signatures (without weighting).
pub fn aggregate_signatures(signatures: &[group::Signature]) -> group::Signature {
    let mut s = G2::zero();
    for sig in signatures {
        s.add(sig);
    }
    s
}

/// Computes the secure aggregation coefficient of every public key.
///
/// `t_i = H(pk_i || H(pk_1 || ... || pk_n))`, reduced into the scalar field.
fn secure_coefficients(publics: &[group::Public]) -> Vec<Scalar> {
    let mut hasher = Sha256::new();
    for public in publics {
        hasher.update(&public.encode());
    }
    let all = hasher.finalize();

    publics
        .par_iter()
        .map(|public| {
            let mut hasher = Sha256::new();
            hasher.update(&public.encode()).update(&all);
            Scalar::map(&hasher.finalize())
        })
        .collect()
}

/// Aggregates the public keys of a signer set with secure aggregation coefficients.
pub fn secure_aggregate_public_keys(publics: &[group::Public]) -> group::Public {
    let coefficients = secure_coefficients(publics);
    publics
        .par_iter()
        .zip(coefficients.par_iter())
        .map(|(public, coefficient)| {
            let mut weighted = *public;
            weighted.mul(coefficient);
            weighted
        })
        .reduce(group::Public::zero, |mut acc, weighted| {
            acc.add(&weighted);
            acc
        })
}

/// Aggregates signatures over the same message with secure aggregation coefficients.
///
/// `publics[i]` must be the key that produced `signatures[i]`.
pub fn secure_aggregate_signatures(
    publics: &[group::Public],
    signatures: &[group::Signature],
) -> Result<group::Signature, Error> {
    if publics.len() != signatures.len() {
        return Err(Error::MismatchedLengths(publics.len(), signatures.len()));
    }
    let coefficients = secure_coefficients(publics);
    Ok(signatures
        .par_iter()
        .zip(coefficients.par_iter())
        .map(|(signature, coefficient)| {
            let mut weighted = *signature;
            weighted.mul(coefficient);
            weighted
        })
        .reduce(G2::zero, |mut acc, weighted| {
            acc.add(&weighted);
            acc
        }))
}

/// Verifies a securely aggregated signature over `message` by `publics`.
pub fn verify_secure_aggregate(
    publics: &[group::Public],
    message: &[u8],
    signature: &group::Signature,
) -> Result<(), Error> {
    let public = secure_aggregate_public_keys(publics);
    verify_message(&public, message, signature)
}

/// Recovers a threshold signature from the first `threshold` `(member id, partial)` pairs.
pub fn threshold_signature_recover<'a, I>(
    threshold: usize,
    partials: I,
) -> Result<group::Signature, Error>
where
    I: IntoIterator<Item = (&'a Scalar, &'a group::Signature)>,
{
    Poly::<G2>::recover(threshold, partials)
}
