//! Answer complaints by revealing the disputed shares.

use super::{Phase, Session};
use crate::{
    status::Activity,
    store::Store,
    wire::{Justification, Kind, LazySignature, Message},
    worker::Worker,
    Error, Fault, Outbox, Relay, Reporter,
};
use futures::executor::block_on;
use llmq_cryptography::bls12381::primitives::group::{Private, Scalar};
use rand::{CryptoRng, Rng};
use std::{collections::BTreeSet, time::Instant};
use tracing::{debug, info, warn};

impl<R, W, S, Z, L> Session<R, W, S, Z, L>
where
    R: Rng + CryptoRng,
    W: Worker,
    S: Store,
    Z: Reporter,
    L: Relay,
{
    /// Marks members with enough bad votes (or with conflicting complaints) as bad and, if any
    /// member complained about us, broadcasts the shares we dealt to them.
    ///
    /// Does nothing for observers.
    pub fn verify_and_justify(&mut self, outbox: &mut impl Outbox) {
        self.enter(Phase::Justify);
        let Some(local) = &self.local else {
            return;
        };
        let (index, secret) = (local.index, local.secret);

        let mut justify_for = BTreeSet::new();
        for i in 0..self.members.len() {
            let member = &self.members[i];
            if member.bad {
                continue;
            }
            let votes = member.bad_member_votes.len();
            if votes >= self.params.bad_votes_threshold {
                info!(member = %member.identity, votes, "voted bad");
                self.mark_bad(i);
                continue;
            }
            let mut complaints = member.complaints.iter();
            let (Some(digest), None) = (complaints.next(), complaints.next()) else {
                if !member.complaints.is_empty() {
                    info!(member = %member.identity, "multiple complaints");
                    self.mark_bad(i);
                }
                continue;
            };
            let covers = self
                .complaints
                .get(digest)
                .is_some_and(|complaint| complaint.complain_for_members.get(index));
            if covers {
                justify_for.insert(i);
            }
        }
        if justify_for.is_empty() {
            return;
        }

        self.send_justification(index, &secret, justify_for, outbox);
    }

    fn send_justification(
        &mut self,
        index: usize,
        secret: &Private,
        justify_for: BTreeSet<usize>,
        outbox: &mut impl Outbox,
    ) {
        if self.sk_contributions.len() != self.members.len() {
            warn!("no contributions to justify");
            return;
        }

        let mut contributions = Vec::with_capacity(justify_for.len());
        for i in justify_for {
            let mut share = self.sk_contributions[i];
            if i != index && self.faults.should(Fault::JustifyLie, &mut self.rng) {
                debug!(member = %self.members[i].identity, "lying in justification");
                share = Scalar::rand(&mut self.rng);
            }
            contributions.push((i as u32, share));
        }
        if self.faults.should(Fault::JustifyOmit, &mut self.rng) {
            info!("omitting justification");
            return;
        }

        let mut msg = Justification {
            quorum_type: self.params.quorum_type,
            anchor: self.anchor,
            sender: self.members[index].identity,
            contributions,
            signature: LazySignature::default(),
        };
        msg.sign(secret);
        info!(count = msg.contributions.len(), "sending justification");
        self.reporter.report(Activity::Sent(Kind::Justification));
        outbox.push(Message::Justification(msg));
    }

    /// Performs cheap checks on a justification (signatures are not verified).
    pub fn pre_verify_justification(&self, msg: &Justification) -> Result<(), Error> {
        let index = self.check_header(msg.quorum_type, &msg.anchor, &msg.sender)?;
        if msg.contributions.is_empty() {
            return Err(Error::EmptyJustification);
        }
        let mut seen = BTreeSet::new();
        for (target, share) in &msg.contributions {
            let target = *target as usize;
            if target >= self.members.len() {
                return Err(Error::InvalidIndex(target));
            }
            if !seen.insert(target) {
                return Err(Error::DuplicateIndex(target));
            }
            if share.is_zero() {
                return Err(Error::InvalidShare(target));
            }
        }
        if self.members[index].justifications.len() >= 2 {
            return Err(Error::TooManyMessages);
        }
        Ok(())
    }

    /// Accepts a pre-verified justification with a valid signature.
    pub fn receive_justification(&mut self, msg: Justification) {
        let Some(index) = self.member_index(&msg.sender) else {
            debug!(sender = %msg.sender, "justification from unknown sender");
            return;
        };
        let digest = msg.digest();
        let member = &mut self.members[index];
        if member.justifications.contains(&digest) || member.justifications.len() >= 2 {
            return;
        }
        member.justifications.insert(digest);
        let count = member.justifications.len();
        let identity = member.identity;

        let contributions = msg.contributions.clone();
        self.justifications.insert(digest, msg);
        self.relay(Kind::Justification, digest);
        self.reporter.report(Activity::Received {
            kind: Kind::Justification,
            member: index,
        });
        if count > 1 {
            warn!(member = %identity, "multiple justifications");
            self.mark_bad(index);
            return;
        }

        // Relayed so peers that disagree can still judge, but no second chance
        if self.members[index].bad {
            debug!(member = %identity, "justification from bad member");
            return;
        }

        // Every revealed share must answer a complaint
        let mut targets = Vec::with_capacity(contributions.len());
        for (target, share) in contributions {
            let target = target as usize;
            let Some(complainer) = self.members.get(target) else {
                warn!(member = %identity, target, "justification for unknown member");
                self.mark_bad(index);
                return;
            };
            if !self.members[index]
                .complaints_from_others
                .contains(&complainer.identity)
            {
                warn!(member = %identity, target, "justification without complaint");
                self.mark_bad(index);
            }
            targets.push((target, share));
        }
        if self.members[index].bad {
            return;
        }
        let Some(vvec) = self.received_vvecs[index].clone() else {
            warn!(member = %identity, "justification without contribution");
            self.mark_bad(index);
            return;
        };

        // Submit every share before waiting on any
        let start = Instant::now();
        let receivers = targets
            .iter()
            .map(|(target, share)| {
                self.worker
                    .verify_share_async(self.members[*target].id, vvec.clone(), *share)
            })
            .collect::<Vec<_>>();
        let local_index = self.local.as_ref().map(|local| local.index);
        for ((target, share), receiver) in targets.into_iter().zip(receivers) {
            let complainer = self.members[target].identity;
            if !block_on(receiver).unwrap_or(false) {
                warn!(member = %identity, %complainer, "invalid justification");
                self.mark_bad(index);
                continue;
            }
            debug!(member = %identity, %complainer, "justified");
            if local_index == Some(target) {
                self.received_shares[index] = Some(share);
                self.members[index].we_complain = false;
                self.store.write_verified_share(
                    self.params.quorum_type,
                    &self.anchor,
                    &identity,
                    share,
                );
            }
            self.members[index]
                .complaints_from_others
                .remove(&complainer);
        }

        let received = self
            .members
            .iter()
            .filter(|m| !m.justifications.is_empty())
            .count();
        let expected = self.members.iter().filter(|m| m.someone_complain).count();
        debug!(
            received,
            expected,
            elapsed = ?start.elapsed(),
            "verified justification"
        );
    }
}
