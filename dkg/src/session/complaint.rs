//! Complain about silent and invalid dealers.

use super::{Phase, Session};
use crate::{
    status::Activity,
    store::Store,
    wire::{Complaint, Kind, LazySignature, Message},
    worker::Worker,
    Error, Outbox, Relay, Reporter,
};
use llmq_cryptography::bls12381::primitives::group::Private;
use llmq_utils::BitVec;
use rand::{CryptoRng, Rng};
use tracing::{debug, info, warn};

impl<R, W, S, Z, L> Session<R, W, S, Z, L>
where
    R: Rng + CryptoRng,
    W: Worker,
    S: Store,
    Z: Reporter,
    L: Relay,
{
    /// Verifies any queued contributions, marks members that never contributed as bad, and
    /// broadcasts a complaint if any member is bad or dealt us an invalid share.
    ///
    /// Does nothing for observers.
    pub fn verify_and_complain(&mut self, outbox: &mut impl Outbox) {
        self.enter(Phase::Complain);
        let Some(local) = &self.local else {
            return;
        };
        let (index, secret) = (local.index, local.secret);

        self.verify_pending_contributions();
        for i in 0..self.members.len() {
            if self.members[i].contributions.is_empty() {
                info!(member = %self.members[i].identity, "no contribution");
                self.mark_bad(i);
            }
        }

        self.send_complaint(index, &secret, outbox);
    }

    fn send_complaint(&mut self, index: usize, secret: &Private, outbox: &mut impl Outbox) {
        let mut bad_members = BitVec::zeroes(self.params.size);
        let mut complain_for_members = BitVec::zeroes(self.params.size);
        for member in &self.members {
            if member.bad {
                bad_members.set(member.index, true);
            } else if member.we_complain {
                complain_for_members.set(member.index, true);
            }
        }
        if !bad_members.any() && !complain_for_members.any() {
            debug!("nothing to complain about");
            return;
        }
        let bad = bad_members.count_ones();
        let complaints = complain_for_members.count_ones();

        let mut msg = Complaint {
            quorum_type: self.params.quorum_type,
            anchor: self.anchor,
            sender: self.members[index].identity,
            bad_members,
            complain_for_members,
            signature: LazySignature::default(),
        };
        msg.sign(secret);
        info!(bad, complaints, "sending complaint");
        self.reporter.report(Activity::Sent(Kind::Complaint));
        outbox.push(Message::Complaint(msg));
    }

    /// Performs cheap checks on a complaint (signatures are not verified).
    pub fn pre_verify_complaint(&self, msg: &Complaint) -> Result<(), Error> {
        let index = self.check_header(msg.quorum_type, &msg.anchor, &msg.sender)?;
        for bits in [&msg.bad_members, &msg.complain_for_members] {
            if bits.len() != self.params.size {
                return Err(Error::InvalidWidth(bits.len()));
            }
        }
        if self.members[index].complaints.len() >= 2 {
            return Err(Error::TooManyMessages);
        }
        Ok(())
    }

    /// Accepts a pre-verified complaint with a valid signature.
    pub fn receive_complaint(&mut self, msg: Complaint) {
        let Some(index) = self.member_index(&msg.sender) else {
            debug!(sender = %msg.sender, "complaint from unknown sender");
            return;
        };
        let digest = msg.digest();
        let member = &mut self.members[index];
        if member.complaints.contains(&digest) || member.complaints.len() >= 2 {
            return;
        }
        member.complaints.insert(digest);
        let count = member.complaints.len();
        let identity = member.identity;

        let votes = msg.bad_members.ones_iter().collect::<Vec<_>>();
        let complaints = msg.complain_for_members.ones_iter().collect::<Vec<_>>();
        self.complaints.insert(digest, msg);
        self.relay(Kind::Complaint, digest);
        self.reporter.report(Activity::Received {
            kind: Kind::Complaint,
            member: index,
        });
        if count > 1 {
            warn!(member = %identity, "multiple complaints");
            self.mark_bad(index);
            return;
        }

        for i in votes {
            if let Some(member) = self.members.get_mut(i) {
                member.bad_member_votes.insert(identity);
            }
        }
        for i in complaints {
            let Some(member) = self.members.get_mut(i) else {
                continue;
            };
            member.complaints_from_others.insert(identity);
            member.someone_complain = true;
            self.reporter.report(Activity::ComplaintFrom {
                member: i,
                from: index,
            });
        }
        debug!(
            member = %identity,
            received = self.complaints.len(),
            "received complaint"
        );
    }
}
