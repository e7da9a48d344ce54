//! A single quorum DKG session.
//!
//! A [Session] holds everything one node learns while a quorum forms: the member registry, the
//! messages it accepted, the verification vectors and shares dealt to it, and the premature
//! commitments it verified. Every function that changes this state takes `&mut self`, so
//! inserting a message and relaying it happen atomically with respect to any other message.
//! Callers that pre-verify messages from many peers concurrently can hold the session in a
//! `RwLock` (every `pre_verify_*` function takes `&self`).
//!
//! Operations of each phase live in their own module:
//!
//! - [contribution]: dealing and verifying contributions.
//! - [complaint]: complaining about silent or invalid dealers.
//! - [justification]: answering complaints.
//! - [commitment]: signing the outcome and verifying the outcome of others.
//! - [finalize]: aggregating premature commitments into final commitments.

use crate::{
    cache::Cache,
    config::{Config, Operator},
    member::Member,
    status::Activity,
    wire::{Complaint, Contribution, Justification, Kind, PrematureCommitment},
    Error, Faults, Inventory, Params, Relay, Reporter,
};
use llmq_cryptography::{
    bls12381::primitives::{
        group::{Private, Scalar},
        poly,
    },
    Digest,
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};
use tracing::info;

pub mod commitment;
pub mod complaint;
pub mod contribution;
pub mod finalize;
pub mod justification;

#[cfg(test)]
mod tests;

/// The phase a session is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Initialized,
    Contribute,
    Complain,
    Justify,
    Commit,
    Finalize,
}

/// The outcome of verifying a premature commitment against local state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    /// The commitment matches what we computed and its quorum signature is valid.
    Valid,
    /// We lack the contributions required to check the commitment.
    Unverifiable,
    /// The commitment disagrees with what we computed or its quorum signature is invalid.
    Invalid,
}

/// The local member.
struct Local {
    index: usize,
    id: Scalar,
    secret: Private,
}

/// A quorum DKG session.
pub struct Session<R, W, S, Z, L> {
    rng: R,
    params: Params,
    anchor: Digest,
    worker: W,
    store: Arc<S>,
    cache: Arc<Cache>,
    reporter: Z,
    relay: L,
    faults: Faults,
    verify_batch_size: usize,

    members: Vec<Member>,
    members_map: HashMap<Digest, usize>,
    identities: Vec<Digest>,
    local: Option<Local>,

    vvec_contribution: Option<poly::Public>,
    sk_contributions: Vec<Scalar>,
    received_vvecs: Vec<Option<Arc<poly::Public>>>,
    received_shares: Vec<Option<Scalar>>,
    pending: Vec<usize>,

    contributions: BTreeMap<Digest, Contribution>,
    complaints: BTreeMap<Digest, Complaint>,
    justifications: BTreeMap<Digest, Justification>,
    premature_commitments: BTreeMap<Digest, PrematureCommitment>,
    relayed: BTreeSet<Inventory>,
    valid_commitments: BTreeSet<Digest>,

    phase: Phase,
}

impl<R, W, S, Z: Reporter, L: Relay> Session<R, W, S, Z, L> {
    /// Creates a session for the quorum described by `cfg`.
    ///
    /// The session is a member if the configured operator is one of the members and an
    /// observer otherwise.
    pub fn new(rng: R, cfg: Config<W, S, Z, L>) -> Result<Self, Error> {
        let params = cfg.params;
        params.validate()?;
        if cfg.verify_batch_size == 0 {
            return Err(Error::InvalidParams("verify batch size must be positive"));
        }
        let count = cfg.members.len();
        if count < params.min_size {
            return Err(Error::NotEnoughMembers(count, params.min_size));
        }
        if count > params.size {
            return Err(Error::TooManyMembers(count, params.size));
        }

        let mut members = Vec::with_capacity(count);
        let mut members_map = HashMap::with_capacity(count);
        for (index, participant) in cfg.members.iter().enumerate() {
            if members_map.insert(participant.identity, index).is_some() {
                return Err(Error::DuplicateMember(participant.identity));
            }
            members.push(Member::new(index, participant));
        }
        let identities = members.iter().map(|m| m.identity).collect();
        let local = cfg.operator.and_then(|Operator { identity, secret }| {
            let index = *members_map.get(&identity)?;
            Some(Local {
                index,
                id: members[index].id,
                secret,
            })
        });

        let mut session = Self {
            rng,
            params,
            anchor: cfg.anchor,
            worker: cfg.worker,
            store: cfg.store,
            cache: cfg.cache,
            reporter: cfg.reporter,
            relay: cfg.relay,
            faults: cfg.faults,
            verify_batch_size: cfg.verify_batch_size,

            members,
            members_map,
            identities,
            local,

            vvec_contribution: None,
            sk_contributions: Vec::new(),
            received_vvecs: vec![None; count],
            received_shares: vec![None; count],
            pending: Vec::new(),

            contributions: BTreeMap::new(),
            complaints: BTreeMap::new(),
            justifications: BTreeMap::new(),
            premature_commitments: BTreeMap::new(),
            relayed: BTreeSet::new(),
            valid_commitments: BTreeSet::new(),

            phase: Phase::Initialized,
        };
        match session.local.as_ref().map(|local| local.index) {
            Some(index) => {
                info!(members = count, index, anchor = %session.anchor, "initialized as member");
                session.reporter.report(Activity::Initialized {
                    quorum_type: params.quorum_type,
                    anchor: session.anchor,
                    members: count,
                    index,
                });
            }
            None => info!(members = count, anchor = %session.anchor, "initialized as observer"),
        }
        Ok(session)
    }

    /// Marks `index` bad (if it is not already).
    fn mark_bad(&mut self, index: usize) {
        let member = &mut self.members[index];
        if member.bad {
            return;
        }
        member.bad = true;
        self.reporter.report(Activity::Bad(index));
    }

    /// Relays the inventory of an accepted message (once).
    fn relay(&mut self, kind: Kind, digest: Digest) {
        let inventory = Inventory::new(kind, digest);
        if self.relayed.insert(inventory) {
            self.relay.relay(inventory);
        }
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.reporter.report(Activity::Phase(phase));
    }
}

impl<R, W, S, Z, L> Session<R, W, S, Z, L> {
    /// Checks the quorum and sender of a message, returning the sender's index.
    fn check_header(&self, quorum_type: u8, anchor: &Digest, sender: &Digest) -> Result<usize, Error> {
        if quorum_type != self.params.quorum_type {
            return Err(Error::WrongQuorumType(quorum_type));
        }
        if anchor != &self.anchor {
            return Err(Error::WrongQuorum(*anchor));
        }
        self.member_index(sender)
            .ok_or(Error::UnknownSender(*sender))
    }

    /// Returns the index of the member with `identity`.
    pub fn member_index(&self, identity: &Digest) -> Option<usize> {
        self.members_map.get(identity).copied()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn anchor(&self) -> &Digest {
        &self.anchor
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns every member, in quorum order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Returns the index of the local member (`None` for observers).
    pub fn local_index(&self) -> Option<usize> {
        self.local.as_ref().map(|local| local.index)
    }

    /// Returns true if the session participates in the quorum.
    pub fn is_member(&self) -> bool {
        self.local.is_some()
    }

    /// Returns the verification vector the local member dealt.
    pub fn verification_vector(&self) -> Option<&poly::Public> {
        self.vvec_contribution.as_ref()
    }

    pub fn contribution(&self, digest: &Digest) -> Option<&Contribution> {
        self.contributions.get(digest)
    }

    pub fn complaint(&self, digest: &Digest) -> Option<&Complaint> {
        self.complaints.get(digest)
    }

    pub fn justification(&self, digest: &Digest) -> Option<&Justification> {
        self.justifications.get(digest)
    }

    pub fn premature_commitment(&self, digest: &Digest) -> Option<&PrematureCommitment> {
        self.premature_commitments.get(digest)
    }

    /// Returns the inventory of every message relayed so far.
    pub fn relayed(&self) -> impl Iterator<Item = &Inventory> {
        self.relayed.iter()
    }

    /// Returns true if the premature commitment named by `digest` was fully verified.
    pub fn is_valid_commitment(&self, digest: &Digest) -> bool {
        self.valid_commitments.contains(digest)
    }
}
