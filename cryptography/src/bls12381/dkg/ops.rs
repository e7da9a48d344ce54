//! Stateless operations useful in a quorum DKG.

use crate::{
    bls12381::primitives::{
        group::{Element, Public, Scalar},
        ops::compute_public,
        poly,
    },
    Sha256,
};
use llmq_codec::Encode;
use rand::RngCore;
use rayon::prelude::*;

/// Generates a random verification vector of length `threshold` and one secret share per
/// member id (in the order provided).
pub fn generate_contributions<R: RngCore>(
    rng: &mut R,
    threshold: usize,
    ids: &[Scalar],
) -> (poly::Public, Vec<Scalar>) {
    assert!(threshold > 0, "threshold must be positive");
    let mut secret = poly::new_from(threshold as u32 - 1, rng);
    let commitment = poly::Public::commit(&secret);
    let shares = ids.iter().map(|id| secret.evaluate(id)).collect();
    secret.clear();
    (commitment, shares)
}

/// Returns true if `vvec` has exactly `threshold` coefficients, none of which is the identity.
pub fn verify_verification_vector(vvec: &poly::Public, threshold: usize) -> bool {
    vvec.required() == threshold && vvec.coefficients().iter().all(|c| !c.is_zero())
}

/// Returns true if `share` is the evaluation at `id` of the polynomial committed to by `vvec`.
pub fn verify_contribution_share(id: &Scalar, vvec: &poly::Public, share: &Scalar) -> bool {
    if share.is_zero() {
        return false;
    }
    compute_public(share) == vvec.evaluate(id)
}

/// Derives a weight for every `(vvec, share)` pair from the full batch so a dealer cannot pick
/// an error that cancels out the error of another.
fn batch_weights(vvecs: &[&poly::Public], shares: &[Scalar]) -> Vec<Scalar> {
    let mut hasher = Sha256::new();
    for (vvec, share) in vvecs.iter().zip(shares) {
        hasher.update(&vvec.encode()).update(&share.encode());
    }
    let transcript = hasher.finalize();
    (0..shares.len())
        .map(|i| {
            let mut hasher = Sha256::new();
            hasher.update(&transcript).update(&(i as u64).to_be_bytes());
            Scalar::map(&hasher.finalize())
        })
        .collect()
}

/// Verifies many shares addressed to `id`, returning one result per `(vvec, share)` pair.
///
/// The whole batch is first checked with a single weighted equation. Only if that fails is
/// every pair checked individually (in parallel).
pub fn verify_contribution_shares(
    id: &Scalar,
    vvecs: &[&poly::Public],
    shares: &[Scalar],
) -> Vec<bool> {
    assert_eq!(vvecs.len(), shares.len(), "mismatched batch");
    if shares.is_empty() {
        return Vec::new();
    }

    // Batch check: sum(w_i * s_i) * G == sum(w_i * vvec_i(id))
    if shares.iter().all(|share| !share.is_zero()) {
        let weights = batch_weights(vvecs, shares);
        let (secret, public) = vvecs
            .par_iter()
            .zip(shares.par_iter())
            .zip(weights.par_iter())
            .map(|((vvec, share), weight)| {
                let mut secret = *share;
                secret.mul(weight);
                let mut public = vvec.evaluate(id);
                public.mul(weight);
                (secret, public)
            })
            .reduce(
                || (Scalar::zero(), Public::zero()),
                |(mut secret, mut public), (s, p)| {
                    secret.add(&s);
                    public.add(&p);
                    (secret, public)
                },
            );
        if compute_public(&secret) == public {
            return vec![true; shares.len()];
        }
    }

    vvecs
        .par_iter()
        .zip(shares.par_iter())
        .map(|(vvec, share)| verify_contribution_share(id, vvec, share))
        .collect()
}

/// Sums verification vectors into the quorum verification vector.
///
/// Returns `None` if no vectors are provided or their lengths differ.
pub fn aggregate_verification_vectors(vvecs: &[&poly::Public]) -> Option<poly::Public> {
    let (first, rest) = vvecs.split_first()?;
    let mut aggregate = (*first).clone();
    for vvec in rest {
        if vvec.required() != aggregate.required() {
            return None;
        }
        aggregate.add(vvec);
    }
    Some(aggregate)
}

/// Sums secret shares into a share of the quorum key.
///
/// Returns `None` if no shares are provided.
pub fn aggregate_secrets(shares: &[Scalar]) -> Option<Scalar> {
    let (first, rest) = shares.split_first()?;
    let mut aggregate = *first;
    for share in rest {
        aggregate.add(share);
    }
    Some(aggregate)
}
