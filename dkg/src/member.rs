//! Quorum members and what a session has observed about them.

use llmq_cryptography::{
    bls12381::primitives::group::{Public, Scalar},
    Digest,
};
use std::collections::BTreeSet;

/// A quorum member as provided by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Participant {
    /// Identity hash of the member (unique in the quorum).
    pub identity: Digest,
    /// Operator public key (used to encrypt shares and verify message signatures).
    pub operator: Public,
}

/// The state a session tracks for every member.
#[derive(Clone, Debug)]
pub struct Member {
    /// Position in the quorum (fixed for the session).
    pub index: usize,
    pub identity: Digest,
    /// Point at which the member's shares are evaluated.
    pub id: Scalar,
    pub operator: Public,

    /// Set once the member is excluded from the quorum. Never reset.
    pub bad: bool,

    pub contributions: BTreeSet<Digest>,
    pub complaints: BTreeSet<Digest>,
    pub justifications: BTreeSet<Digest>,
    pub premature_commitments: BTreeSet<Digest>,

    /// Set if the share this member dealt to us is missing or invalid.
    pub we_complain: bool,
    /// Set if any member complained about this member.
    pub someone_complain: bool,
    /// Identities of the members that complained about this member (and have not been
    /// answered with a valid justification).
    pub complaints_from_others: BTreeSet<Digest>,
    /// Identities of the members that consider this member bad.
    pub bad_member_votes: BTreeSet<Digest>,
}

impl Member {
    /// Creates a member at `index`, deriving its id from its identity hash.
    pub fn new(index: usize, participant: &Participant) -> Self {
        Self {
            index,
            identity: participant.identity,
            id: Scalar::from_id(participant.identity.as_bytes()),
            operator: participant.operator,
            bad: false,
            contributions: BTreeSet::new(),
            complaints: BTreeSet::new(),
            justifications: BTreeSet::new(),
            premature_commitments: BTreeSet::new(),
            we_complain: false,
            someone_complain: false,
            complaints_from_others: BTreeSet::new(),
            bad_member_votes: BTreeSet::new(),
        }
    }
}
