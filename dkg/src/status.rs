//! Report the progress of a session.

use crate::{wire::Kind, Phase, Reporter};
use llmq_cryptography::Digest;
use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, PoisonError},
};

/// Something a session observed or did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Activity {
    /// A member session was created.
    Initialized {
        quorum_type: u8,
        anchor: Digest,
        members: usize,
        index: usize,
    },
    /// The session entered a phase.
    Phase(Phase),
    /// The local member broadcast a message.
    Sent(Kind),
    /// A message from `member` was accepted.
    Received { kind: Kind, member: usize },
    /// `member` was excluded from the quorum.
    Bad(usize),
    /// The share `member` dealt to us is missing or invalid.
    WeComplain(usize),
    /// `from` complained about `member`.
    ComplaintFrom { member: usize, from: usize },
    /// Final commitments were produced.
    Finalized { commitments: usize },
}

/// What a session observed about a member.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemberStatus {
    pub bad: bool,
    pub we_complain: bool,
    pub received_contribution: bool,
    pub received_complaint: bool,
    pub received_justification: bool,
    pub received_premature_commitment: bool,
    /// Indexes of the members that complained about this member.
    pub complaints_from: BTreeSet<usize>,
}

/// A snapshot of a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub quorum_type: u8,
    pub anchor: Digest,
    /// Index of the local member.
    pub index: usize,
    pub phase: Option<Phase>,
    pub sent_contribution: bool,
    pub sent_complaint: bool,
    pub sent_justification: bool,
    pub sent_premature_commitment: bool,
    pub final_commitments: usize,
    pub members: Vec<MemberStatus>,
}

impl SessionStatus {
    /// Returns the number of members marked bad.
    pub fn count_bad(&self) -> usize {
        self.members.iter().filter(|m| m.bad).count()
    }

    fn member(&mut self, index: usize) -> Option<&mut MemberStatus> {
        self.members.get_mut(index)
    }

    fn apply(&mut self, activity: Activity) {
        match activity {
            Activity::Initialized {
                quorum_type,
                anchor,
                members,
                index,
            } => {
                *self = SessionStatus {
                    quorum_type,
                    anchor,
                    index,
                    members: vec![MemberStatus::default(); members],
                    ..Default::default()
                };
            }
            Activity::Phase(phase) => self.phase = Some(phase),
            Activity::Sent(kind) => match kind {
                Kind::Contribution => self.sent_contribution = true,
                Kind::Complaint => self.sent_complaint = true,
                Kind::Justification => self.sent_justification = true,
                Kind::PrematureCommitment => self.sent_premature_commitment = true,
            },
            Activity::Received { kind, member } => {
                let Some(member) = self.member(member) else {
                    return;
                };
                match kind {
                    Kind::Contribution => member.received_contribution = true,
                    Kind::Complaint => member.received_complaint = true,
                    Kind::Justification => member.received_justification = true,
                    Kind::PrematureCommitment => member.received_premature_commitment = true,
                }
            }
            Activity::Bad(member) => {
                if let Some(member) = self.member(member) {
                    member.bad = true;
                }
            }
            Activity::WeComplain(member) => {
                if let Some(member) = self.member(member) {
                    member.we_complain = true;
                }
            }
            Activity::ComplaintFrom { member, from } => {
                if let Some(member) = self.member(member) {
                    member.complaints_from.insert(from);
                }
            }
            Activity::Finalized { commitments } => self.final_commitments = commitments,
        }
    }
}

/// A [Reporter] that keeps a [SessionStatus] up to date.
///
/// Clones share the same status.
#[derive(Clone, Default)]
pub struct Tracker {
    status: Arc<Mutex<SessionStatus>>,
}

impl Tracker {
    /// Returns a snapshot of the tracked session.
    pub fn status(&self) -> SessionStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Reporter for Tracker {
    fn report(&mut self, activity: Activity) {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(activity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker() {
        let mut tracker = Tracker::default();
        let observer = tracker.clone();
        tracker.report(Activity::Initialized {
            quorum_type: 100,
            anchor: Digest::from([1u8; 32]),
            members: 3,
            index: 1,
        });
        tracker.report(Activity::Phase(Phase::Complain));
        tracker.report(Activity::Sent(Kind::Complaint));
        tracker.report(Activity::Received {
            kind: Kind::Contribution,
            member: 2,
        });
        tracker.report(Activity::Bad(0));
        tracker.report(Activity::WeComplain(2));
        tracker.report(Activity::ComplaintFrom { member: 2, from: 1 });

        // Out of range members are ignored
        tracker.report(Activity::Bad(7));

        let status = observer.status();
        assert_eq!(status.quorum_type, 100);
        assert_eq!(status.index, 1);
        assert_eq!(status.phase, Some(Phase::Complain));
        assert!(status.sent_complaint);
        assert!(!status.sent_contribution);
        assert!(status.members[2].received_contribution);
        assert!(status.members[2].we_complain);
        assert_eq!(status.members[2].complaints_from, BTreeSet::from([1]));
        assert_eq!(status.count_bad(), 1);
    }
}
