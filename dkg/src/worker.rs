//! Cryptographic work performed on behalf of a session.

use futures::channel::oneshot;
use llmq_cryptography::bls12381::{
    dkg::ops,
    ies::EncryptedShares,
    primitives::{
        group::{Private, Public, Scalar},
        poly,
    },
};
use rand::{CryptoRng, RngCore};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::Arc;
use tracing::debug;

/// Worker is the interface responsible for the expensive cryptography of a session.
pub trait Worker: Send + Sync {
    /// Deals a random polynomial of `threshold` coefficients, returning its commitment and its
    /// evaluation at every id (in order).
    fn generate<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        threshold: usize,
        ids: &[Scalar],
    ) -> Option<(poly::Public, Vec<Scalar>)>;

    /// Returns true if `vvec` is a well-formed verification vector of `threshold` coefficients.
    fn verify_verification_vector(&self, vvec: &poly::Public, threshold: usize) -> bool;

    /// Verifies every `shares[i]` (addressed to `id`) against `vvecs[i]`.
    fn verify_shares(&self, id: &Scalar, vvecs: &[&poly::Public], shares: &[Scalar]) -> Vec<bool>;

    /// Starts verifying a single share, returning a receiver for the outcome.
    ///
    /// If the receiver is dropped, the share should be considered invalid.
    fn verify_share_async(
        &self,
        id: Scalar,
        vvec: Arc<poly::Public>,
        share: Scalar,
    ) -> oneshot::Receiver<bool>;

    /// Encrypts `shares[i]` to `recipients[i]`.
    fn encrypt_shares<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        recipients: &[Public],
        shares: &[Scalar],
    ) -> Option<EncryptedShares>;

    /// Decrypts the share addressed to the recipient at `index`.
    fn decrypt_share(
        &self,
        shares: &EncryptedShares,
        index: usize,
        private: &Private,
    ) -> Option<Scalar>;
}

/// A [Worker] backed by `blst` that verifies on a dedicated thread pool.
#[derive(Clone)]
pub struct Bls {
    pool: Arc<ThreadPool>,
}

impl Bls {
    /// Creates a worker with `threads` verification threads.
    pub fn new(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("llmq-dkg-{i}"))
            .build()?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

impl Worker for Bls {
    fn generate<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        threshold: usize,
        ids: &[Scalar],
    ) -> Option<(poly::Public, Vec<Scalar>)> {
        if threshold == 0 || threshold > ids.len() {
            return None;
        }
        Some(ops::generate_contributions(rng, threshold, ids))
    }

    fn verify_verification_vector(&self, vvec: &poly::Public, threshold: usize) -> bool {
        ops::verify_verification_vector(vvec, threshold)
    }

    fn verify_shares(&self, id: &Scalar, vvecs: &[&poly::Public], shares: &[Scalar]) -> Vec<bool> {
        if vvecs.len() != shares.len() {
            return Vec::new();
        }
        self.pool
            .install(|| ops::verify_contribution_shares(id, vvecs, shares))
    }

    fn verify_share_async(
        &self,
        id: Scalar,
        vvec: Arc<poly::Public>,
        share: Scalar,
    ) -> oneshot::Receiver<bool> {
        let (sender, receiver) = oneshot::channel();
        self.pool.spawn(move || {
            let valid = ops::verify_contribution_share(&id, &vvec, &share);
            if sender.send(valid).is_err() {
                debug!("share verification abandoned");
            }
        });
        receiver
    }

    fn encrypt_shares<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        recipients: &[Public],
        shares: &[Scalar],
    ) -> Option<EncryptedShares> {
        EncryptedShares::encrypt(rng, recipients, shares).ok()
    }

    fn decrypt_share(
        &self,
        shares: &EncryptedShares,
        index: usize,
        private: &Private,
    ) -> Option<Scalar> {
        shares.decrypt(index, private).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use llmq_cryptography::bls12381::primitives::ops::keypair;
    use rand::{rngs::StdRng, SeedableRng};

    fn ids(n: u8) -> Vec<Scalar> {
        (1..=n).map(|i| Scalar::from_id(&[i; 32])).collect()
    }

    #[test]
    fn test_generate() {
        let worker = Bls::new(2).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let ids = ids(4);
        let (vvec, shares) = worker.generate(&mut rng, 3, &ids).unwrap();
        assert!(worker.verify_verification_vector(&vvec, 3));
        let vvecs = vec![&vvec; 4];
        let results = ids
            .iter()
            .zip(&shares)
            .map(|(id, share)| worker.verify_shares(id, &vvecs[..1], &[*share]))
            .collect::<Vec<_>>();
        assert!(results.iter().all(|r| r == &vec![true]));

        assert!(worker.generate(&mut rng, 0, &ids).is_none());
        assert!(worker.generate(&mut rng, 5, &ids).is_none());
    }

    #[test]
    fn test_verify_share_async() {
        let worker = Bls::new(2).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let ids = ids(3);
        let (vvec, shares) = worker.generate(&mut rng, 2, &ids).unwrap();
        let vvec = Arc::new(vvec);

        // Submit everything before awaiting anything
        let receivers = vec![
            worker.verify_share_async(ids[0], vvec.clone(), shares[0]),
            worker.verify_share_async(ids[1], vvec.clone(), shares[2]),
            worker.verify_share_async(ids[2], vvec, shares[2]),
        ];
        let results = receivers
            .into_iter()
            .map(|receiver| block_on(receiver).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(results, vec![true, false, true]);
    }

    #[test]
    fn test_encrypt_decrypt() {
        let worker = Bls::new(1).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let keys = (0..3).map(|_| keypair(&mut rng)).collect::<Vec<_>>();
        let recipients = keys.iter().map(|(_, public)| *public).collect::<Vec<_>>();
        let shares = (0..3).map(|_| Scalar::rand(&mut rng)).collect::<Vec<_>>();
        let sealed = worker
            .encrypt_shares(&mut rng, &recipients, &shares)
            .unwrap();
        assert_eq!(worker.decrypt_share(&sealed, 1, &keys[1].0), Some(shares[1]));
        assert_eq!(worker.decrypt_share(&sealed, 1, &keys[0].0), None);
        assert!(worker
            .encrypt_shares(&mut rng, &recipients[..2], &shares)
            .is_none());
    }
}
