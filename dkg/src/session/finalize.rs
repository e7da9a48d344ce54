//! Aggregate premature commitments into final commitments.

use super::{Phase, Session};
use crate::{
    status::Activity,
    store::Store,
    wire::{build_commitment_hash, FinalCommitment, PrematureCommitment},
    worker::Worker,
    Relay, Reporter,
};
use llmq_cryptography::bls12381::primitives::{
    group::{Public, Scalar, Signature},
    ops::{secure_aggregate_signatures, threshold_signature_recover},
};
use llmq_utils::BitVec;
use rand::{CryptoRng, Rng};
use std::{collections::BTreeMap, time::Instant};
use tracing::{debug, info, warn};

/// The parts of a premature commitment that are aggregated.
struct Signer {
    operator: Public,
    id: Scalar,
    signature: Signature,
    quorum_signature: Signature,
}

impl<R, W, S, Z, L> Session<R, W, S, Z, L>
where
    R: Rng + CryptoRng,
    W: Worker,
    S: Store,
    Z: Reporter,
    L: Relay,
{
    /// Builds one final commitment for every set of valid members that at least `min_size`
    /// members agreed on.
    ///
    /// Returns nothing for observers.
    pub fn finalize_commitments(&mut self) -> Vec<FinalCommitment> {
        self.enter(Phase::Finalize);
        if self.local.is_none() {
            return Vec::new();
        }

        // Group valid commitments by the members they consider valid
        let mut groups: BTreeMap<&BitVec, Vec<&PrematureCommitment>> = BTreeMap::new();
        for (digest, commitment) in &self.premature_commitments {
            if self.valid_commitments.contains(digest) {
                groups
                    .entry(&commitment.valid_members)
                    .or_default()
                    .push(commitment);
            }
        }

        let start = Instant::now();
        let mut finals = Vec::new();
        for (valid_members, group) in groups {
            if group.len() < self.params.min_size {
                debug!(
                    valid = valid_members.count_ones(),
                    commitments = group.len(),
                    "not enough commitments"
                );
                continue;
            }
            if let Some(commitment) = self.aggregate(&group) {
                finals.push(commitment);
            }
        }
        info!(
            commitments = finals.len(),
            elapsed = ?start.elapsed(),
            "finalized commitments"
        );
        self.reporter.report(Activity::Finalized {
            commitments: finals.len(),
        });
        finals
    }

    /// Aggregates a group of commitments over the same set of valid members.
    fn aggregate(&self, group: &[&PrematureCommitment]) -> Option<FinalCommitment> {
        let first = group.first()?;
        let commitment_hash = build_commitment_hash(
            first.quorum_type,
            &first.anchor,
            &first.valid_members,
            &first.quorum_public_key,
            &first.quorum_vvec_hash,
        );

        // Signers are ordered by member index
        let mut signers = BTreeMap::new();
        for commitment in group {
            if commitment.quorum_public_key != first.quorum_public_key
                || commitment.quorum_vvec_hash != first.quorum_vvec_hash
            {
                debug!(member = %commitment.sender, "commitment disagrees with the first of its group");
                continue;
            }
            let Some(index) = self.member_index(&commitment.sender) else {
                continue;
            };
            if signers.contains_key(&index) {
                continue;
            }
            let (Some(signature), Some(quorum_signature)) =
                (commitment.signature.get(), commitment.quorum_signature.get())
            else {
                continue;
            };
            let member = &self.members[index];
            signers.insert(
                index,
                Signer {
                    operator: member.operator,
                    id: member.id,
                    signature,
                    quorum_signature,
                },
            );
        }
        if signers.len() < self.params.min_size {
            debug!(signers = signers.len(), "not enough agreeing signers");
            return None;
        }

        let operators = signers.values().map(|s| s.operator).collect::<Vec<_>>();
        let signatures = signers.values().map(|s| s.signature).collect::<Vec<_>>();
        let members_signature = match secure_aggregate_signatures(&operators, &signatures) {
            Ok(signature) => signature,
            Err(err) => {
                warn!(?err, "failed to aggregate member signatures");
                return None;
            }
        };
        let quorum_signature = match threshold_signature_recover(
            self.params.threshold,
            signers.values().map(|s| (&s.id, &s.quorum_signature)),
        ) {
            Ok(signature) => signature,
            Err(err) => {
                warn!(?err, "failed to recover quorum signature");
                return None;
            }
        };

        Some(FinalCommitment {
            quorum_type: first.quorum_type,
            anchor: first.anchor,
            signers: BitVec::from_indices(self.params.size, signers.keys().copied()),
            valid_members: first.valid_members.clone(),
            quorum_public_key: first.quorum_public_key,
            quorum_vvec_hash: first.quorum_vvec_hash,
            quorum_signature,
            members_signature,
        })
    }
}
