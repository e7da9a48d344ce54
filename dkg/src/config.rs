use crate::{cache::Cache, Faults, Params, Participant};
use llmq_cryptography::{bls12381::primitives::group::Private, Digest};
use std::sync::Arc;

/// Default number of queued contributions verified in a batch.
pub const DEFAULT_VERIFY_BATCH_SIZE: usize = 32;

/// The operator running the session (if it is a quorum member).
#[derive(Clone)]
pub struct Operator {
    /// Identity hash of the operator.
    pub identity: Digest,
    /// Operator secret key (used to decrypt shares and sign messages).
    pub secret: Private,
}

/// Configuration for a [crate::Session].
pub struct Config<W, S, Z, L> {
    /// Parameters of the quorum type.
    pub params: Params,

    /// Hash of the block that anchors the quorum.
    pub anchor: Digest,

    /// Quorum members, in quorum order.
    pub members: Vec<Participant>,

    /// Local operator.
    ///
    /// If `None`, or if the operator is not in `members`, the session only observes.
    pub operator: Option<Operator>,

    /// Performs the expensive cryptography.
    pub worker: W,

    /// Persists verified contributions.
    pub store: Arc<S>,

    /// Memoizes quorum aggregates (may be shared between sessions).
    pub cache: Arc<Cache>,

    /// Receives status updates.
    pub reporter: Z,

    /// Announces accepted messages to peers.
    pub relay: L,

    /// Deliberate misbehavior (none by default).
    pub faults: Faults,

    /// Number of queued contributions that triggers a batch verification.
    pub verify_batch_size: usize,
}
