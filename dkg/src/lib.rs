//! Run a masternode quorum distributed key generation (DKG) session.
//!
//! # Overview
//!
//! A fixed, ordered set of quorum members jointly generates a threshold BLS key without a
//! trusted dealer. Every member deals a random polynomial of degree `threshold - 1`, sends an
//! encrypted share of it to every other member, and publishes a commitment to it (the
//! verification vector). Members that misbehave (by staying silent, dealing invalid shares,
//! or failing to answer complaints) are excluded from the final key. Observers (nodes that are
//! not quorum members) follow the protocol and relay messages, but never contribute.
//!
//! The session is driven externally, once per phase:
//!
//! 1. [Session::contribute]: deal and broadcast a [wire::Contribution].
//! 2. [Session::verify_and_complain]: mark silent members bad and broadcast a
//!    [wire::Complaint] about every member whose share did not verify.
//! 3. [Session::verify_and_justify]: reveal, in a [wire::Justification], the share of every
//!    member that complained about us.
//! 4. [Session::verify_and_commit]: exclude members with unresolved complaints and sign the
//!    resulting quorum key in a [wire::PrematureCommitment].
//! 5. [Session::finalize_commitments]: aggregate matching premature commitments into
//!    [wire::FinalCommitment]s.
//!
//! Between phases, every message received from the network should first be checked with the
//! matching (cheap) `pre_verify_*` function, then have its operator signature verified by the
//! caller (see [wire::Contribution::verify_signature]), and finally be handed to the matching
//! `receive_*` function. A message accepted by the session is relayed (at most once) via the
//! [Relay] provided at construction.
//!
//! # Faults
//!
//! A session can be asked to misbehave on purpose (see [faults::Faults]). This is only useful
//! to exercise the complaint and justification paths of honest peers.
//!
//! # Status
//!
//! `llmq-dkg` is **ALPHA** software and is not yet recommended for production use.

use futures::channel::mpsc;
use llmq_cryptography::Digest;
use thiserror::Error;
use tracing::debug;

pub mod cache;
pub mod config;
pub use config::{Config, Operator};
pub mod faults;
pub use faults::{Fault, Faults};
pub mod member;
pub use member::{Member, Participant};
pub mod params;
pub use params::Params;
pub mod session;
pub use session::{Phase, Session, Verification};
pub mod status;
pub use status::Activity;
pub mod store;
pub mod wire;
pub use wire::{Inventory, Message};
pub mod worker;

/// Outbox receives every message the session wants broadcast to the quorum.
pub trait Outbox {
    /// Queue a message for broadcast.
    fn push(&mut self, message: Message);
}

impl Outbox for Vec<Message> {
    fn push(&mut self, message: Message) {
        Vec::push(self, message);
    }
}

impl Outbox for mpsc::UnboundedSender<Message> {
    fn push(&mut self, message: Message) {
        if self.unbounded_send(message).is_err() {
            debug!("outbox closed");
        }
    }
}

/// Relay is the interface responsible for announcing accepted messages to peers.
///
/// The session only hands over the inventory of a message. It is up to the relay to select
/// peers (usually other quorum members and observers) and serve the full message when asked
/// (see [Session::contribution] and friends).
pub trait Relay {
    /// Announce the message named by `inventory`.
    fn relay(&mut self, inventory: Inventory);
}

impl Relay for Vec<Inventory> {
    fn relay(&mut self, inventory: Inventory) {
        self.push(inventory);
    }
}

impl Relay for mpsc::UnboundedSender<Inventory> {
    fn relay(&mut self, inventory: Inventory) {
        if self.unbounded_send(inventory).is_err() {
            debug!("relay closed");
        }
    }
}

/// Reporter is the interface responsible for reporting the progress of a session.
///
/// Reports are fire-and-forget. Implementations must not block.
pub trait Reporter {
    /// Report some activity observed by the session.
    fn report(&mut self, activity: Activity);
}

impl Reporter for () {
    fn report(&mut self, _: Activity) {}
}

impl<R: Reporter> Reporter for Option<R> {
    fn report(&mut self, activity: Activity) {
        if let Some(reporter) = self {
            reporter.report(activity);
        }
    }
}

/// Errors that can occur when setting up a session or checking a message.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid params: {0}")]
    InvalidParams(&'static str),
    #[error("not enough members: {0} < {1}")]
    NotEnoughMembers(usize, usize),
    #[error("too many members: {0} > {1}")]
    TooManyMembers(usize, usize),
    #[error("duplicate member: {0}")]
    DuplicateMember(Digest),
    #[error("unknown fault: {0}")]
    UnknownFault(String),
    #[error("invalid fault rate: {0}")]
    InvalidFaultRate(String),

    #[error("wrong quorum type: {0}")]
    WrongQuorumType(u8),
    #[error("wrong quorum: {0}")]
    WrongQuorum(Digest),
    #[error("unknown sender: {0}")]
    UnknownSender(Digest),
    #[error("too many messages from sender")]
    TooManyMessages,
    #[error("invalid contribution count: {0}")]
    InvalidContributionCount(usize),
    #[error("invalid verification vector length: {0}")]
    InvalidVerificationVectorLength(usize),
    #[error("invalid verification vector")]
    InvalidVerificationVector,
    #[error("invalid bit-vector width: {0}")]
    InvalidWidth(usize),
    #[error("empty justification")]
    EmptyJustification,
    #[error("invalid member index: {0}")]
    InvalidIndex(usize),
    #[error("duplicate member index: {0}")]
    DuplicateIndex(usize),
    #[error("invalid share for member {0}")]
    InvalidShare(usize),
    #[error("not enough valid members: {0}")]
    NotEnoughValidMembers(usize),
    #[error("not enough signers: {0}")]
    NotEnoughSigners(usize),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid quorum signature")]
    InvalidQuorumSignature,
}

impl Error {
    /// Returns true if the peer that sent the offending message should be penalized.
    ///
    /// Messages for another quorum and messages beyond the per-sender cap are dropped
    /// silently: an honest peer may send either.
    pub fn ban(&self) -> bool {
        !matches!(
            self,
            Error::WrongQuorumType(_) | Error::WrongQuorum(_) | Error::TooManyMessages
        )
    }
}
