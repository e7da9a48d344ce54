//! Memoize aggregates that every premature commitment of a quorum would otherwise recompute.
//!
//! Most premature commitments received by a session agree on the set of valid members, so the
//! quorum verification vector (and the public key share of each sender) only needs to be built
//! once per set. Entries are keyed by a hash of their inputs (see [key] and [key_with_id]).

use llmq_codec::Encode;
use llmq_cryptography::{
    bls12381::{
        dkg::ops,
        primitives::{
            group::{Public, Scalar},
            ops::public_key_share,
            poly,
        },
    },
    Digest, Sha256,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Returns the cache key of an aggregate over the contributions of `indexes`.
pub fn key(quorum_type: u8, anchor: &Digest, indexes: &[usize]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(&[quorum_type]).update(anchor);
    for index in indexes {
        hasher.update(&(*index as u64).to_be_bytes());
    }
    hasher.finalize()
}

/// Returns the cache key of a value derived for member `id` from the aggregate of `indexes`.
pub fn key_with_id(quorum_type: u8, anchor: &Digest, indexes: &[usize], id: &Scalar) -> Digest {
    let mut hasher = Sha256::new();
    hasher
        .update(&key(quorum_type, anchor, indexes))
        .update(&id.encode());
    hasher.finalize()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A thread-safe cache of quorum aggregates.
#[derive(Default)]
pub struct Cache {
    vvecs: Mutex<HashMap<Digest, Arc<poly::Public>>>,
    secrets: Mutex<HashMap<Digest, Scalar>>,
    public_shares: Mutex<HashMap<Digest, Public>>,
}

impl Cache {
    /// Returns the sum of `vvecs`, building it on a miss.
    ///
    /// Returns `None` (and caches nothing) if the vectors cannot be aggregated.
    pub fn build_quorum_verification_vector(
        &self,
        key: Digest,
        vvecs: &[&poly::Public],
    ) -> Option<Arc<poly::Public>> {
        if let Some(vvec) = lock(&self.vvecs).get(&key) {
            return Some(vvec.clone());
        }
        let vvec = Arc::new(ops::aggregate_verification_vectors(vvecs)?);
        Some(lock(&self.vvecs).entry(key).or_insert(vvec).clone())
    }

    /// Returns the sum of `shares`, building it on a miss.
    ///
    /// Shares are dealt to a single member, so `key` must name that member (see [key_with_id]).
    pub fn aggregate_secret_keys(&self, key: Digest, shares: &[Scalar]) -> Option<Scalar> {
        if let Some(secret) = lock(&self.secrets).get(&key) {
            return Some(*secret);
        }
        let secret = ops::aggregate_secrets(shares)?;
        Some(*lock(&self.secrets).entry(key).or_insert(secret))
    }

    /// Returns the public key share of `id` under `vvec`, building it on a miss.
    ///
    /// Returns `None` if the share is the identity.
    pub fn build_public_key_share(
        &self,
        key: Digest,
        vvec: &poly::Public,
        id: &Scalar,
    ) -> Option<Public> {
        if let Some(public) = lock(&self.public_shares).get(&key) {
            return Some(*public);
        }
        let public = public_key_share(vvec, id);
        if public.is_zero() {
            return None;
        }
        Some(*lock(&self.public_shares).entry(key).or_insert(public))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmq_cryptography::bls12381::primitives::ops::compute_public;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_keys() {
        let anchor = Digest::from([1u8; 32]);
        let id = Scalar::from_id(&[2u8; 32]);
        assert_eq!(key(1, &anchor, &[0, 1, 2]), key(1, &anchor, &[0, 1, 2]));
        assert_ne!(key(1, &anchor, &[0, 1, 2]), key(1, &anchor, &[0, 1, 3]));
        assert_ne!(key(1, &anchor, &[0, 1, 2]), key(2, &anchor, &[0, 1, 2]));
        assert_ne!(
            key_with_id(1, &anchor, &[0, 1], &id),
            key(1, &anchor, &[0, 1])
        );
    }

    #[test]
    fn test_memoized() {
        let mut rng = StdRng::seed_from_u64(0);
        let ids = (1..=3u8)
            .map(|i| Scalar::from_id(&[i; 32]))
            .collect::<Vec<_>>();
        let dealings = (0..3)
            .map(|_| ops::generate_contributions(&mut rng, 2, &ids))
            .collect::<Vec<_>>();
        let vvecs = dealings.iter().map(|(vvec, _)| vvec).collect::<Vec<_>>();
        let anchor = Digest::from([9u8; 32]);
        let cache = Cache::default();

        let k = key(1, &anchor, &[0, 1, 2]);
        let quorum = cache.build_quorum_verification_vector(k, &vvecs).unwrap();
        // A hit does not look at its inputs
        let hit = cache.build_quorum_verification_vector(k, &[]).unwrap();
        assert!(Arc::ptr_eq(&quorum, &hit));

        let shares = dealings
            .iter()
            .map(|(_, shares)| shares[1])
            .collect::<Vec<_>>();
        let secret = cache.aggregate_secret_keys(k, &shares).unwrap();
        assert_eq!(cache.aggregate_secret_keys(k, &[]), Some(secret));

        let public = cache
            .build_public_key_share(key_with_id(1, &anchor, &[0, 1, 2], &ids[1]), &quorum, &ids[1])
            .unwrap();
        assert_eq!(public, compute_public(&secret));

        // Misses with unusable inputs cache nothing
        let other = key(1, &anchor, &[0]);
        assert!(cache.build_quorum_verification_vector(other, &[]).is_none());
        assert!(cache.aggregate_secret_keys(other, &[]).is_none());
    }
}
