//! Persist the contributions a member has verified.
//!
//! A member must still hold every verification vector and share it accepted when it builds its
//! premature commitment (and when it verifies those of others), even if it restarted in between.

use llmq_cryptography::{
    bls12381::primitives::{group::Scalar, poly},
    Digest,
};
use llmq_utils::BitVec;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

/// The verified contributions of a set of members.
#[derive(Clone, Debug, Default)]
pub struct Contributions {
    /// Member indexes (ascending).
    pub indexes: Vec<usize>,
    /// Verification vector dealt by each member.
    pub vvecs: Vec<Arc<poly::Public>>,
    /// Share dealt to the local member by each member.
    pub shares: Vec<Scalar>,
}

/// Store is the interface responsible for persisting verified contributions.
///
/// Entries are keyed by `(quorum type, anchor, identity hash of the dealer)`.
pub trait Store: Send + Sync {
    /// Persists the verification vector dealt by `member`.
    fn write_verified_vvec(
        &self,
        quorum_type: u8,
        anchor: &Digest,
        member: &Digest,
        vvec: Arc<poly::Public>,
    );

    /// Persists the share `member` dealt to the local member.
    fn write_verified_share(&self, quorum_type: u8, anchor: &Digest, member: &Digest, share: Scalar);

    /// Returns the contributions of every member set in `valid_members` (`members` holds the
    /// identity hash of every member, in order).
    ///
    /// Returns `None` if the vector or the share of any of them is missing.
    fn verified_contributions(
        &self,
        quorum_type: u8,
        anchor: &Digest,
        valid_members: &BitVec,
        members: &[Digest],
    ) -> Option<Contributions>;
}

#[derive(Default)]
struct Entry {
    vvec: Option<Arc<poly::Public>>,
    share: Option<Scalar>,
}

/// An in-memory [Store], shareable between sessions.
#[derive(Clone, Default)]
pub struct Memory {
    entries: Arc<Mutex<HashMap<(u8, Digest, Digest), Entry>>>,
}

impl Memory {
    fn update(&self, key: (u8, Digest, Digest), f: impl FnOnce(&mut Entry)) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(entries.entry(key).or_default());
    }
}

impl Store for Memory {
    fn write_verified_vvec(
        &self,
        quorum_type: u8,
        anchor: &Digest,
        member: &Digest,
        vvec: Arc<poly::Public>,
    ) {
        self.update((quorum_type, *anchor, *member), |entry| {
            entry.vvec = Some(vvec)
        });
    }

    fn write_verified_share(&self, quorum_type: u8, anchor: &Digest, member: &Digest, share: Scalar) {
        self.update((quorum_type, *anchor, *member), |entry| {
            entry.share = Some(share)
        });
    }

    fn verified_contributions(
        &self,
        quorum_type: u8,
        anchor: &Digest,
        valid_members: &BitVec,
        members: &[Digest],
    ) -> Option<Contributions> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut contributions = Contributions::default();
        for index in valid_members.ones_iter() {
            let member = members.get(index)?;
            let entry = entries.get(&(quorum_type, *anchor, *member))?;
            contributions.indexes.push(index);
            contributions.vvecs.push(entry.vvec.clone()?);
            contributions.shares.push(entry.share?);
        }
        Some(contributions)
    }
}
