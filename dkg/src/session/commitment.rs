//! Sign the outcome of the session and verify the outcome signed by others.

use super::{Phase, Session, Verification};
use crate::{
    cache,
    status::Activity,
    store::Store,
    wire::{build_commitment_hash, Kind, LazySignature, Message, PrematureCommitment},
    worker::Worker,
    Error, Fault, Outbox, Relay, Reporter,
};
use llmq_codec::Encode;
use llmq_cryptography::{
    bls12381::primitives::{
        group::{Private, Scalar},
        ops::{compute_public, keypair, sign_message, verify_message},
    },
    hash, Digest,
};
use llmq_utils::BitVec;
use rand::{CryptoRng, Rng};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Increments the byte at `index` (used to corrupt a value on purpose).
fn bump<const N: usize>(mut bytes: [u8; N], index: usize) -> [u8; N] {
    bytes[index] = bytes[index].wrapping_add(1);
    bytes
}

impl<R, W, S, Z, L> Session<R, W, S, Z, L>
where
    R: Rng + CryptoRng,
    W: Worker,
    S: Store,
    Z: Reporter,
    L: Relay,
{
    /// Marks members with unanswered complaints as bad and broadcasts a premature commitment
    /// to the quorum formed by the remaining members.
    ///
    /// Does nothing for observers.
    pub fn verify_and_commit(&mut self, outbox: &mut impl Outbox) {
        self.enter(Phase::Commit);
        let Some(local) = &self.local else {
            return;
        };
        let (index, id, secret) = (local.index, local.id, local.secret);

        for i in 0..self.members.len() {
            let member = &self.members[i];
            if member.bad {
                debug!(member = %member.identity, "previously determined bad");
                continue;
            }
            if !member.complaints_from_others.is_empty() {
                info!(
                    member = %member.identity,
                    open = member.complaints_from_others.len(),
                    "open complaints"
                );
                self.mark_bad(i);
            }
        }

        self.send_commitment(index, &id, &secret, outbox);
    }

    fn send_commitment(
        &mut self,
        index: usize,
        id: &Scalar,
        secret: &Private,
        outbox: &mut impl Outbox,
    ) {
        let valid_members = BitVec::from_indices(
            self.params.size,
            self.members.iter().filter(|m| !m.bad).map(|m| m.index),
        );
        let valid = valid_members.count_ones();
        if valid < self.params.min_size {
            warn!(valid, "not enough valid members");
            return;
        }
        if self.faults.should(Fault::CommitOmit, &mut self.rng) {
            info!("omitting commitment");
            return;
        }

        let start = Instant::now();
        let Some(contributions) = self.store.verified_contributions(
            self.params.quorum_type,
            &self.anchor,
            &valid_members,
            &self.identities,
        ) else {
            warn!("failed to get verified contributions");
            return;
        };
        let key = cache::key(
            self.params.quorum_type,
            &self.anchor,
            &contributions.indexes,
        );
        let vvecs = contributions
            .vvecs
            .iter()
            .map(|vvec| vvec.as_ref())
            .collect::<Vec<_>>();
        let Some(vvec) = self.cache.build_quorum_verification_vector(key, &vvecs) else {
            warn!("failed to build quorum verification vector");
            return;
        };
        // Shares differ per member, so the aggregate is keyed by our id
        let share_key = cache::key_with_id(
            self.params.quorum_type,
            &self.anchor,
            &contributions.indexes,
            id,
        );
        let Some(share) = self
            .cache
            .aggregate_secret_keys(share_key, &contributions.shares)
        else {
            warn!("failed to build secret key share");
            return;
        };
        debug!(
            public = ?compute_public(&share),
            elapsed = ?start.elapsed(),
            "built secret key share"
        );

        let mut quorum_public_key = *vvec.constant();
        let mut quorum_vvec_hash = hash(&vvec.encode());
        let lie = self
            .faults
            .should(Fault::CommitLie, &mut self.rng)
            .then(|| self.rng.gen_range(0..5));
        if let Some(lie) = lie {
            info!(lie, "lying in commitment");
        }
        match lie {
            Some(0) => quorum_public_key = keypair(&mut self.rng).1,
            Some(1) => quorum_vvec_hash = Digest::from(bump(*quorum_vvec_hash.as_bytes(), 0)),
            _ => {}
        }
        let mut commitment_hash = build_commitment_hash(
            self.params.quorum_type,
            &self.anchor,
            &valid_members,
            &quorum_public_key,
            &quorum_vvec_hash,
        );
        if lie == Some(2) {
            commitment_hash = Digest::from(bump(*commitment_hash.as_bytes(), 0));
        }

        let mut signature = LazySignature::new(&sign_message(secret, &commitment_hash));
        let mut quorum_signature = LazySignature::new(&sign_message(&share, &commitment_hash));
        match lie {
            Some(3) => signature = LazySignature::from_bytes(bump(*signature.as_bytes(), 5)),
            Some(4) => {
                quorum_signature = LazySignature::from_bytes(bump(*quorum_signature.as_bytes(), 5))
            }
            _ => {}
        }

        let msg = PrematureCommitment {
            quorum_type: self.params.quorum_type,
            anchor: self.anchor,
            sender: self.members[index].identity,
            valid_members,
            quorum_public_key,
            quorum_vvec_hash,
            quorum_signature,
            signature,
        };
        info!(valid, elapsed = ?start.elapsed(), "sending premature commitment");
        self.reporter
            .report(Activity::Sent(Kind::PrematureCommitment));
        outbox.push(Message::PrematureCommitment(msg));
    }

    /// Performs cheap checks on a premature commitment (signatures are decoded but not
    /// verified).
    pub fn pre_verify_premature_commitment(&self, msg: &PrematureCommitment) -> Result<(), Error> {
        let index = self.check_header(msg.quorum_type, &msg.anchor, &msg.sender)?;
        if msg.valid_members.len() != self.params.size {
            return Err(Error::InvalidWidth(msg.valid_members.len()));
        }
        let valid = msg.count_valid_members();
        if valid < self.params.min_size {
            return Err(Error::NotEnoughValidMembers(valid));
        }
        if msg.signature.get().is_none() {
            return Err(Error::InvalidSignature);
        }
        if msg.quorum_signature.get().is_none() {
            return Err(Error::InvalidQuorumSignature);
        }
        if let Some(i) = msg
            .valid_members
            .ones_iter()
            .find(|i| *i >= self.members.len())
        {
            return Err(Error::InvalidIndex(i));
        }
        if self.members[index].premature_commitments.len() >= 2 {
            return Err(Error::TooManyMessages);
        }
        Ok(())
    }

    /// Checks a premature commitment against the contributions we verified.
    ///
    /// Depends only on the session and the store, so calling it repeatedly yields the same
    /// result.
    pub fn verify_premature_commitment(&self, msg: &PrematureCommitment) -> Verification {
        let Some(index) = self.member_index(&msg.sender) else {
            return Verification::Invalid;
        };
        let Some(contributions) = self.store.verified_contributions(
            self.params.quorum_type,
            &self.anchor,
            &msg.valid_members,
            &self.identities,
        ) else {
            debug!(member = %msg.sender, "missing contributions for commitment");
            return Verification::Unverifiable;
        };
        let key = cache::key(
            self.params.quorum_type,
            &self.anchor,
            &contributions.indexes,
        );
        let vvecs = contributions
            .vvecs
            .iter()
            .map(|vvec| vvec.as_ref())
            .collect::<Vec<_>>();
        let Some(vvec) = self.cache.build_quorum_verification_vector(key, &vvecs) else {
            debug!(member = %msg.sender, "failed to build quorum verification vector");
            return Verification::Unverifiable;
        };

        if vvec.constant() != &msg.quorum_public_key {
            debug!(member = %msg.sender, "quorum public key mismatch");
            return Verification::Invalid;
        }
        if hash(&vvec.encode()) != msg.quorum_vvec_hash {
            debug!(member = %msg.sender, "quorum verification vector hash mismatch");
            return Verification::Invalid;
        }

        let id: &Scalar = &self.members[index].id;
        let share_key = cache::key_with_id(
            self.params.quorum_type,
            &self.anchor,
            &contributions.indexes,
            id,
        );
        let Some(public) = self.cache.build_public_key_share(share_key, &vvec, id) else {
            debug!(member = %msg.sender, "failed to build public key share");
            return Verification::Invalid;
        };
        let Some(quorum_signature) = msg.quorum_signature.get() else {
            return Verification::Invalid;
        };
        if verify_message(&public, &msg.sign_hash(), &quorum_signature).is_err() {
            debug!(member = %msg.sender, "invalid quorum signature");
            return Verification::Invalid;
        }
        Verification::Valid
    }

    /// Accepts a pre-verified premature commitment with a valid operator signature.
    ///
    /// The commitment is stored regardless of its validity, relayed if it is valid (or cannot
    /// be checked locally), and only considered during finalization if it is valid.
    pub fn receive_premature_commitment(&mut self, msg: PrematureCommitment) {
        let Some(index) = self.member_index(&msg.sender) else {
            debug!(sender = %msg.sender, "commitment from unknown sender");
            return;
        };
        let digest = msg.digest();
        let member = &mut self.members[index];
        if member.premature_commitments.contains(&digest)
            || member.premature_commitments.len() >= 2
        {
            return;
        }
        member.premature_commitments.insert(digest);
        let count = member.premature_commitments.len();
        let identity = member.identity;
        if count > 1 {
            warn!(member = %identity, "multiple premature commitments");
            self.mark_bad(index);
        }

        let start = Instant::now();
        let verification = self.verify_premature_commitment(&msg);
        self.premature_commitments.insert(digest, msg);
        match verification {
            Verification::Invalid => {
                debug!(member = %identity, "dropping invalid commitment");
                return;
            }
            Verification::Unverifiable => {
                debug!(member = %identity, "relaying unverifiable commitment");
            }
            Verification::Valid => {
                self.valid_commitments.insert(digest);
            }
        }
        self.relay(Kind::PrematureCommitment, digest);
        self.reporter.report(Activity::Received {
            kind: Kind::PrematureCommitment,
            member: index,
        });
        debug!(
            member = %identity,
            valid = self.valid_commitments.len(),
            elapsed = ?start.elapsed(),
            "received premature commitment"
        );
    }
}
