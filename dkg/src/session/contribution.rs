//! Deal and verify contributions.

use super::{Phase, Session};
use crate::{
    status::Activity,
    store::Store,
    wire::{Contribution, Kind, LazySignature, Message},
    worker::Worker,
    Error, Fault, Outbox, Relay, Reporter,
};
use llmq_cryptography::bls12381::primitives::group::{Private, Scalar};
use rand::{CryptoRng, Rng};
use std::{mem, sync::Arc, time::Instant};
use tracing::{debug, info, warn};

impl<R, W, S, Z, L> Session<R, W, S, Z, L>
where
    R: Rng + CryptoRng,
    W: Worker,
    S: Store,
    Z: Reporter,
    L: Relay,
{
    /// Deals a random polynomial to every member and broadcasts the resulting contribution.
    ///
    /// Does nothing for observers.
    pub fn contribute(&mut self, outbox: &mut impl Outbox) {
        self.enter(Phase::Contribute);
        let Some(local) = &self.local else {
            return;
        };
        let (index, secret) = (local.index, local.secret);

        let start = Instant::now();
        let ids = self.members.iter().map(|m| m.id).collect::<Vec<_>>();
        let Some((vvec, shares)) = self
            .worker
            .generate(&mut self.rng, self.params.threshold, &ids)
        else {
            warn!("failed to generate contributions");
            return;
        };
        debug!(elapsed = ?start.elapsed(), "generated contributions");
        self.vvec_contribution = Some(vvec);
        self.sk_contributions = shares;

        self.send_contribution(index, &secret, outbox);
    }

    fn send_contribution(&mut self, index: usize, secret: &Private, outbox: &mut impl Outbox) {
        if self.faults.should(Fault::ContributionOmit, &mut self.rng) {
            info!("omitting contribution");
            return;
        }
        let Some(vvec) = self.vvec_contribution.clone() else {
            return;
        };

        let start = Instant::now();
        let mut shares = self.sk_contributions.clone();
        for (i, share) in shares.iter_mut().enumerate() {
            if i != index && self.faults.should(Fault::ContributionLie, &mut self.rng) {
                debug!(member = %self.members[i].identity, "lying in contribution");
                *share = Scalar::rand(&mut self.rng);
            }
        }
        let recipients = self.members.iter().map(|m| m.operator).collect::<Vec<_>>();
        let Some(encrypted) = self
            .worker
            .encrypt_shares(&mut self.rng, &recipients, &shares)
        else {
            warn!("failed to encrypt contributions");
            return;
        };
        debug!(elapsed = ?start.elapsed(), "encrypted contributions");

        let mut msg = Contribution {
            quorum_type: self.params.quorum_type,
            anchor: self.anchor,
            sender: self.members[index].identity,
            vvec,
            shares: encrypted,
            signature: LazySignature::default(),
        };
        msg.sign(secret);
        self.reporter.report(Activity::Sent(Kind::Contribution));
        outbox.push(Message::Contribution(msg));
    }

    /// Performs cheap checks on a contribution (signatures are not verified).
    pub fn pre_verify_contribution(&self, msg: &Contribution) -> Result<(), Error> {
        let index = self.check_header(msg.quorum_type, &msg.anchor, &msg.sender)?;
        if msg.shares.len() != self.members.len() {
            return Err(Error::InvalidContributionCount(msg.shares.len()));
        }
        if msg.vvec.required() != self.params.threshold {
            return Err(Error::InvalidVerificationVectorLength(msg.vvec.required()));
        }
        if !self
            .worker
            .verify_verification_vector(&msg.vvec, self.params.threshold)
        {
            return Err(Error::InvalidVerificationVector);
        }

        // Bail before any expensive verification if the sender already sent more than one
        if self.members[index].contributions.len() >= 2 {
            return Err(Error::TooManyMessages);
        }
        Ok(())
    }

    /// Accepts a pre-verified contribution with a valid signature.
    pub fn receive_contribution(&mut self, msg: Contribution) {
        let Some(index) = self.member_index(&msg.sender) else {
            debug!(sender = %msg.sender, "contribution from unknown sender");
            return;
        };
        let digest = msg.digest();
        let member = &mut self.members[index];
        if member.contributions.contains(&digest) || member.contributions.len() >= 2 {
            return;
        }
        member.contributions.insert(digest);
        let count = member.contributions.len();
        let identity = member.identity;

        let vvec = Arc::new(msg.vvec.clone());
        self.contributions.insert(digest, msg);
        self.relay(Kind::Contribution, digest);
        self.reporter.report(Activity::Received {
            kind: Kind::Contribution,
            member: index,
        });
        if count > 1 {
            warn!(member = %identity, "multiple contributions");
            self.mark_bad(index);
            return;
        }
        self.received_vvecs[index] = Some(vvec.clone());
        debug!(
            member = %identity,
            received = self.contributions.len(),
            "received contribution"
        );

        let Some(local) = &self.local else {
            return;
        };
        let (local_index, secret) = (local.index, local.secret);
        self.store
            .write_verified_vvec(self.params.quorum_type, &self.anchor, &identity, vvec);

        let share = self
            .contributions
            .get(&digest)
            .and_then(|msg| self.worker.decrypt_share(&msg.shares, local_index, &secret));
        let complain = match share {
            None => {
                debug!(member = %identity, "failed to decrypt contribution");
                true
            }
            Some(_) if index != local_index
                && self.faults.should(Fault::ComplainLie, &mut self.rng) =>
            {
                debug!(member = %identity, "lying about contribution");
                true
            }
            Some(_) => false,
        };
        if complain {
            self.members[index].we_complain = true;
            self.reporter.report(Activity::WeComplain(index));
            return;
        }

        self.received_shares[index] = share;
        self.pending.push(index);
        if self.pending.len() >= self.verify_batch_size {
            self.verify_pending_contributions();
        }
    }

    /// Verifies every queued share in one batch.
    ///
    /// Members whose share does not verify are complained about. Valid shares are persisted.
    pub fn verify_pending_contributions(&mut self) {
        let pending = mem::take(&mut self.pending);
        let Some(local) = &self.local else {
            return;
        };
        let id = local.id;

        let mut indexes = Vec::with_capacity(pending.len());
        let mut vvecs = Vec::with_capacity(pending.len());
        let mut shares = Vec::with_capacity(pending.len());
        for index in pending {
            let member = &self.members[index];
            if member.bad || member.we_complain {
                continue;
            }
            let (Some(vvec), Some(share)) = (&self.received_vvecs[index], self.received_shares[index])
            else {
                continue;
            };
            indexes.push(index);
            vvecs.push(vvec.as_ref());
            shares.push(share);
        }
        if indexes.is_empty() {
            return;
        }

        let start = Instant::now();
        let results = self.worker.verify_shares(&id, &vvecs, &shares);
        if results.len() != indexes.len() {
            warn!(
                expected = indexes.len(),
                got = results.len(),
                "unexpected verification results"
            );
            return;
        }
        for ((index, share), valid) in indexes.into_iter().zip(shares).zip(results) {
            let identity = self.members[index].identity;
            if valid {
                self.store.write_verified_share(
                    self.params.quorum_type,
                    &self.anchor,
                    &identity,
                    share,
                );
            } else {
                debug!(member = %identity, "invalid contribution");
                self.members[index].we_complain = true;
                self.reporter.report(Activity::WeComplain(index));
            }
        }
        debug!(elapsed = ?start.elapsed(), "verified pending contributions");
    }
}
