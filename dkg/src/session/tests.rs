use super::*;
use crate::{
    config::DEFAULT_VERIFY_BATCH_SIZE,
    status::Tracker,
    store::Memory,
    wire::{FinalCommitment, LazySignature, Message},
    worker::Bls,
    Fault, Participant,
};
use llmq_cryptography::bls12381::primitives::{
    group::{Element, Public},
    ops::keypair,
};
use llmq_utils::BitVec;
use rand::{rngs::StdRng, SeedableRng};

type TestSession = Session<StdRng, Bls, Memory, Tracker, Vec<Inventory>>;

const PARAMS: Params = Params::LLMQ_TEST;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

struct Node {
    session: TestSession,
    tracker: Tracker,
    secret: Private,
    online: bool,
}

struct Network {
    participants: Vec<Participant>,
    secrets: Vec<Private>,
    nodes: Vec<Node>,
}

/// Creates `n` members (and one observer if requested) with the faults returned by `faults`.
fn setup(seed: u64, n: usize, observer: bool, faults: impl Fn(usize) -> Faults) -> Network {
    setup_with_cache(seed, n, observer, faults, None)
}

/// Like [setup], but every node uses `cache` if one is provided.
fn setup_with_cache(
    seed: u64,
    n: usize,
    observer: bool,
    faults: impl Fn(usize) -> Faults,
    cache: Option<Arc<Cache>>,
) -> Network {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(seed);
    let worker = Bls::new(2).unwrap();
    let mut participants = Vec::with_capacity(n);
    let mut secrets = Vec::with_capacity(n);
    for _ in 0..n {
        let (secret, operator) = keypair(&mut rng);
        participants.push(Participant {
            identity: Digest::random(&mut rng),
            operator,
        });
        secrets.push(secret);
    }
    let anchor = Digest::random(&mut rng);

    let mut nodes = Vec::new();
    let count = if observer { n + 1 } else { n };
    for i in 0..count {
        let (secret, operator) = if i < n {
            (
                secrets[i],
                Some(Operator {
                    identity: participants[i].identity,
                    secret: secrets[i],
                }),
            )
        } else {
            // Observers have an operator key but are not in the quorum
            let (secret, _) = keypair(&mut rng);
            (
                secret,
                Some(Operator {
                    identity: Digest::random(&mut rng),
                    secret,
                }),
            )
        };
        let tracker = Tracker::default();
        let session = Session::new(
            StdRng::seed_from_u64(seed.wrapping_mul(1000) + i as u64),
            Config {
                params: PARAMS,
                anchor,
                members: participants.clone(),
                operator,
                worker: worker.clone(),
                store: Arc::new(Memory::default()),
                cache: cache.clone().unwrap_or_default(),
                reporter: tracker.clone(),
                relay: Vec::new(),
                faults: faults(i),
                verify_batch_size: DEFAULT_VERIFY_BATCH_SIZE,
            },
        )
        .unwrap();
        nodes.push(Node {
            session,
            tracker,
            secret,
            online: true,
        });
    }
    Network {
        participants,
        secrets,
        nodes,
    }
}

impl Network {
    fn operators(&self) -> Vec<Public> {
        self.participants.iter().map(|p| p.operator).collect()
    }

    /// Hands every message to every online node, returning how many deliveries were rejected.
    fn deliver(&mut self, messages: &[Message]) -> usize {
        let mut rejected = 0;
        for msg in messages {
            for node in self.nodes.iter_mut().filter(|node| node.online) {
                if !deliver(&mut node.session, msg.clone()) {
                    rejected += 1;
                }
            }
        }
        rejected
    }

    /// Runs `phase` on every online node and delivers what they sent.
    fn phase(&mut self, phase: impl Fn(&mut TestSession, &mut Vec<Message>)) -> Vec<Message> {
        let mut outbox = Vec::new();
        for node in self.nodes.iter_mut().filter(|node| node.online) {
            phase(&mut node.session, &mut outbox);
        }
        assert_eq!(self.deliver(&outbox), 0);
        outbox
    }

    /// Runs every phase up to (and including) finalization.
    fn run(&mut self) -> Vec<Vec<FinalCommitment>> {
        self.phase(|s, o| s.contribute(o));
        self.phase(|s, o| s.verify_and_complain(o));
        self.phase(|s, o| s.verify_and_justify(o));
        self.commit()
    }

    /// Runs the commitment phase (delivering leniently) and finalizes.
    fn commit(&mut self) -> Vec<Vec<FinalCommitment>> {
        let mut outbox = Vec::new();
        for node in self.nodes.iter_mut().filter(|node| node.online) {
            node.session.verify_and_commit(&mut outbox);
        }
        self.deliver(&outbox);
        self.nodes
            .iter_mut()
            .filter(|node| node.online)
            .map(|node| node.session.finalize_commitments())
            .collect()
    }
}

/// Pre-verifies, checks the signature of, and receives a message.
fn deliver(session: &mut TestSession, msg: Message) -> bool {
    let Some(sender) = session.member_index(msg.sender()) else {
        return false;
    };
    if !msg.verify_signature(&session.members()[sender].operator) {
        return false;
    }
    match msg {
        Message::Contribution(msg) => {
            if session.pre_verify_contribution(&msg).is_err() {
                return false;
            }
            session.receive_contribution(msg);
        }
        Message::Complaint(msg) => {
            if session.pre_verify_complaint(&msg).is_err() {
                return false;
            }
            session.receive_complaint(msg);
        }
        Message::Justification(msg) => {
            if session.pre_verify_justification(&msg).is_err() {
                return false;
            }
            session.receive_justification(msg);
        }
        Message::PrematureCommitment(msg) => {
            if session.pre_verify_premature_commitment(&msg).is_err() {
                return false;
            }
            session.receive_premature_commitment(msg);
        }
    }
    true
}

fn contributions(messages: &[Message]) -> Vec<Contribution> {
    messages
        .iter()
        .filter_map(|msg| match msg {
            Message::Contribution(msg) => Some(msg.clone()),
            _ => None,
        })
        .collect()
}

fn assert_single_final(
    network: &Network,
    finals: &[Vec<FinalCommitment>],
    valid: &[usize],
    signers: usize,
) {
    let operators = network.operators();
    let first = &finals[0][0];
    for commitments in finals {
        assert_eq!(commitments.len(), 1);
        assert_eq!(&commitments[0], first);
    }
    assert_eq!(
        first.valid_members,
        BitVec::from_indices(PARAMS.size, valid.iter().copied())
    );
    assert_eq!(first.count_signers(), signers);
    first.verify(&PARAMS, &operators).unwrap();
}

#[test]
fn test_all_honest() {
    let mut network = setup(0, 5, true, |_| Faults::default());
    let contributed = network.phase(|s, o| s.contribute(o));
    assert_eq!(contributed.len(), 5);

    // Nothing to complain about, so nothing to justify
    assert!(network.phase(|s, o| s.verify_and_complain(o)).is_empty());
    assert!(network.phase(|s, o| s.verify_and_justify(o)).is_empty());
    let finals = network.commit();

    let observer = network.nodes.pop().unwrap();
    let (members, observer_finals) = finals.split_at(5);
    assert_single_final(&network, members, &[0, 1, 2, 3, 4], 5);
    assert!(observer_finals[0].is_empty());

    for node in &network.nodes {
        assert!(node.session.members().iter().all(|m| !m.bad));
        let status = node.tracker.status();
        assert!(status.sent_contribution);
        assert!(!status.sent_complaint);
        assert!(!status.sent_justification);
        assert!(status.sent_premature_commitment);
        assert_eq!(status.phase, Some(Phase::Finalize));
        assert_eq!(status.final_commitments, 1);
        assert_eq!(status.count_bad(), 0);
    }

    // The observer cannot verify commitments, but still relays them
    assert!(!observer.session.is_member());
    let status = observer.tracker.status();
    assert_eq!(status.phase, Some(Phase::Finalize));
    assert!(status.members.is_empty());
    let relayed = observer.session.relayed().collect::<Vec<_>>();
    assert_eq!(relayed.len(), 10);
    for inventory in relayed {
        if inventory.kind == Kind::PrematureCommitment {
            assert!(!observer.session.is_valid_commitment(&inventory.digest));
            assert!(observer.session.premature_commitment(&inventory.digest).is_some());
        } else {
            assert!(observer.session.contribution(&inventory.digest).is_some());
        }
    }
}

#[test]
fn test_silent_member() {
    let mut network = setup(1, 5, false, |_| Faults::default());
    network.nodes[4].online = false;
    let finals = network.run();
    assert_eq!(finals.len(), 4);
    assert_single_final(&network, &finals, &[0, 1, 2, 3], 4);
    for node in network.nodes.iter().take(4) {
        let silent = &node.session.members()[4];
        assert!(silent.bad);
        assert_eq!(silent.bad_member_votes.len(), 4);
    }
}

#[test]
fn test_invalid_contribution_justified() {
    let mut network = setup(2, 5, false, |i| {
        if i == 0 {
            Faults::default().with(Fault::ContributionLie, 1.0)
        } else {
            Faults::default()
        }
    });
    network.phase(|s, o| s.contribute(o));
    let complaints = network.phase(|s, o| s.verify_and_complain(o));
    assert_eq!(complaints.len(), 4);
    for node in &network.nodes {
        let liar = &node.session.members()[0];
        assert_eq!(liar.complaints_from_others.len(), 4);
        assert!(liar.someone_complain);
    }

    let justifications = network.phase(|s, o| s.verify_and_justify(o));
    assert_eq!(justifications.len(), 1);
    for node in &network.nodes {
        let liar = &node.session.members()[0];
        assert!(!liar.bad);
        assert!(!liar.we_complain);
        assert!(liar.complaints_from_others.is_empty());
    }

    let finals = network.commit();
    assert_single_final(&network, &finals, &[0, 1, 2, 3, 4], 5);
}

#[test]
fn test_undecryptable_share_justified() {
    let mut network = setup(19, 5, false, |_| Faults::default());

    // Member 0 seals a corrupted blob to member 1
    let mut outbox = Vec::new();
    network.nodes[0].session.contribute(&mut outbox);
    let mut tampered = contributions(&outbox).pop().unwrap();
    tampered.shares.blobs[1][0] ^= 1;
    tampered.sign(&network.secrets[0]);
    let mut dealt = vec![Message::Contribution(tampered)];
    for node in network.nodes.iter_mut().skip(1) {
        node.session.contribute(&mut dealt);
    }
    assert_eq!(network.deliver(&dealt), 0);
    assert!(network.nodes[1].session.members()[0].we_complain);

    let complaints = network.phase(|s, o| s.verify_and_complain(o));
    assert_eq!(complaints.len(), 1);
    let justifications = network.phase(|s, o| s.verify_and_justify(o));
    assert_eq!(justifications.len(), 1);
    assert!(!network.nodes[1].session.members()[0].we_complain);

    let finals = network.commit();
    assert_single_final(&network, &finals, &[0, 1, 2, 3, 4], 5);
}

#[test]
fn test_false_complaint_justified() {
    let mut network = setup(3, 5, false, |i| {
        if i == 2 {
            Faults::default().with(Fault::ComplainLie, 1.0)
        } else {
            Faults::default()
        }
    });
    network.phase(|s, o| s.contribute(o));
    let complaints = network.phase(|s, o| s.verify_and_complain(o));
    assert_eq!(complaints.len(), 1);

    // Every accused member answers
    let justifications = network.phase(|s, o| s.verify_and_justify(o));
    assert_eq!(justifications.len(), 4);
    let finals = network.commit();
    assert_single_final(&network, &finals, &[0, 1, 2, 3, 4], 5);
}

#[test]
fn test_invalid_justification() {
    let mut network = setup(4, 5, false, |i| {
        if i == 0 {
            Faults::default()
                .with(Fault::ContributionLie, 1.0)
                .with(Fault::JustifyLie, 1.0)
        } else {
            Faults::default()
        }
    });
    let finals = network.run();

    // Everyone (including the liar) excludes the liar, but the liar still signs
    for node in &network.nodes {
        assert!(node.session.members()[0].bad);
    }
    assert_single_final(&network, &finals, &[1, 2, 3, 4], 5);
}

#[test]
fn test_omitted_justification() {
    let mut network = setup(5, 5, false, |i| {
        if i == 1 {
            Faults::default()
                .with(Fault::ContributionLie, 1.0)
                .with(Fault::JustifyOmit, 1.0)
        } else {
            Faults::default()
        }
    });
    let finals = network.run();
    for node in &network.nodes {
        assert!(node.session.members()[1].bad);
        assert!(!node.session.members()[1].complaints_from_others.is_empty());
    }
    assert_single_final(&network, &finals, &[0, 2, 3, 4], 5);
}

#[test]
fn test_omitted_commitment() {
    let mut network = setup(6, 5, false, |i| {
        if i == 4 {
            Faults::default().with(Fault::CommitOmit, 1.0)
        } else {
            Faults::default()
        }
    });
    let finals = network.run();
    assert_single_final(&network, &finals, &[0, 1, 2, 3, 4], 4);
    assert!(!finals[0][0].signers.get(4));
}

#[test]
fn test_lying_commitment() {
    let mut network = setup(7, 5, false, |i| {
        if i == 3 {
            Faults::default().with(Fault::CommitLie, 1.0)
        } else {
            Faults::default()
        }
    });
    let finals = network.run();
    assert_single_final(&network, &finals, &[0, 1, 2, 3, 4], 4);
    assert!(!finals[0][0].signers.get(3));

    // Dropped commitments are not reported as received
    for node in &network.nodes {
        let status = node.tracker.status();
        assert!(!status.members[3].received_premature_commitment);
        assert!(status.members[0].received_premature_commitment);
    }
}

#[test]
fn test_conflicting_commitments() {
    let mut network = setup(8, 5, false, |_| Faults::default());
    network.phase(|s, o| s.contribute(o));
    network.phase(|s, o| s.verify_and_complain(o));
    network.phase(|s, o| s.verify_and_justify(o));
    let commitments = network.phase(|s, o| s.verify_and_commit(o));
    assert_eq!(commitments.len(), 5);

    // Member 1 signs a second commitment excluding member 4
    let sender = network.participants[1].identity;
    let mut second = commitments
        .iter()
        .find_map(|msg| match msg {
            Message::PrematureCommitment(msg) if msg.sender == sender => Some(msg.clone()),
            _ => None,
        })
        .unwrap();
    second.valid_members.set(4, false);
    second.sign(&network.secrets[1]);
    let digest = second.digest();
    assert_eq!(
        network.deliver(&[Message::PrematureCommitment(second.clone())]),
        0
    );

    for node in &network.nodes {
        let session = &node.session;
        assert!(session.members()[1].bad);
        assert_eq!(session.members()[1].premature_commitments.len(), 2);

        // Recorded, but neither valid nor relayed
        assert!(session.premature_commitment(&digest).is_some());
        assert!(!session.is_valid_commitment(&digest));
        assert_eq!(session.verify_premature_commitment(&second), Verification::Invalid);
        assert!(!session
            .relayed()
            .any(|inventory| inventory.digest == digest));

        // A third is dropped without penalty
        let mut third = second.clone();
        third.valid_members.set(3, false);
        assert_eq!(
            session.pre_verify_premature_commitment(&third),
            Err(Error::TooManyMessages)
        );
    }

    // The first commitment of member 1 still counts
    let finals = network
        .nodes
        .iter_mut()
        .map(|node| node.session.finalize_commitments())
        .collect::<Vec<_>>();
    assert_single_final(&network, &finals, &[0, 1, 2, 3, 4], 5);
}

#[test]
fn test_verify_premature_commitment_idempotent() {
    let mut network = setup(9, 5, false, |_| Faults::default());
    network.phase(|s, o| s.contribute(o));
    network.phase(|s, o| s.verify_and_complain(o));
    network.phase(|s, o| s.verify_and_justify(o));
    let commitments = network.phase(|s, o| s.verify_and_commit(o));
    let session = &network.nodes[2].session;
    for msg in &commitments {
        let Message::PrematureCommitment(msg) = msg else {
            unreachable!();
        };
        assert_eq!(session.verify_premature_commitment(msg), Verification::Valid);
        assert_eq!(session.verify_premature_commitment(msg), Verification::Valid);
        assert!(session.is_valid_commitment(&msg.digest()));
    }
}

#[test]
fn test_pre_verify_contribution() {
    let mut network = setup(10, 5, false, |_| Faults::default());
    let mut outbox = Vec::new();
    network.nodes[0].session.contribute(&mut outbox);
    let original = contributions(&outbox).pop().unwrap();
    let session = &network.nodes[1].session;
    session.pre_verify_contribution(&original).unwrap();

    let mut msg = original.clone();
    msg.anchor = Digest::from([0u8; 32]);
    let err = session.pre_verify_contribution(&msg).unwrap_err();
    assert!(matches!(err, Error::WrongQuorum(_)));
    assert!(!err.ban());

    let mut msg = original.clone();
    msg.quorum_type = 1;
    let err = session.pre_verify_contribution(&msg).unwrap_err();
    assert_eq!(err, Error::WrongQuorumType(1));
    assert!(!err.ban());

    let mut msg = original.clone();
    msg.sender = Digest::from([0u8; 32]);
    let err = session.pre_verify_contribution(&msg).unwrap_err();
    assert!(matches!(err, Error::UnknownSender(_)));
    assert!(err.ban());

    let mut msg = original.clone();
    msg.shares.blobs.pop();
    assert_eq!(
        session.pre_verify_contribution(&msg),
        Err(Error::InvalidContributionCount(4))
    );

    let mut msg = original.clone();
    let mut coefficients = msg.vvec.coefficients().to_vec();
    coefficients.pop();
    msg.vvec = poly::Public::from(coefficients.clone());
    assert_eq!(
        session.pre_verify_contribution(&msg),
        Err(Error::InvalidVerificationVectorLength(2))
    );

    let mut msg = original;
    coefficients.push(Public::zero());
    msg.vvec = poly::Public::from(coefficients);
    assert_eq!(
        session.pre_verify_contribution(&msg),
        Err(Error::InvalidVerificationVector)
    );
}

#[test]
fn test_multiple_contributions() {
    let mut network = setup(11, 5, false, |_| Faults::default());

    // Each call deals a fresh polynomial
    let mut outbox = Vec::new();
    for _ in 0..3 {
        network.nodes[0].session.contribute(&mut outbox);
    }
    let dealt = contributions(&outbox);
    assert_eq!(dealt.len(), 3);

    let session = &mut network.nodes[1].session;
    session.pre_verify_contribution(&dealt[0]).unwrap();
    session.receive_contribution(dealt[0].clone());
    assert!(!session.members()[0].bad);

    // The same message again is ignored
    session.receive_contribution(dealt[0].clone());
    assert_eq!(session.relayed().count(), 1);

    session.pre_verify_contribution(&dealt[1]).unwrap();
    session.receive_contribution(dealt[1].clone());
    assert!(session.members()[0].bad);
    assert_eq!(session.relayed().count(), 2);

    let err = session.pre_verify_contribution(&dealt[2]).unwrap_err();
    assert_eq!(err, Error::TooManyMessages);
    assert!(!err.ban());
}

#[test]
fn test_pre_verify_complaint() {
    let network = setup(12, 5, false, |_| Faults::default());
    let session = &network.nodes[0].session;
    let mut msg = Complaint {
        quorum_type: PARAMS.quorum_type,
        anchor: *session.anchor(),
        sender: network.participants[1].identity,
        bad_members: BitVec::zeroes(PARAMS.size),
        complain_for_members: BitVec::from_indices(PARAMS.size, [2]),
        signature: LazySignature::default(),
    };
    msg.sign(&network.secrets[1]);
    session.pre_verify_complaint(&msg).unwrap();

    msg.bad_members = BitVec::zeroes(PARAMS.size + 1);
    assert_eq!(
        session.pre_verify_complaint(&msg),
        Err(Error::InvalidWidth(PARAMS.size + 1))
    );
}

#[test]
fn test_pre_verify_justification() {
    let network = setup(13, 5, false, |_| Faults::default());
    let session = &network.nodes[0].session;
    let mut rng = StdRng::seed_from_u64(13);
    let base = Justification {
        quorum_type: PARAMS.quorum_type,
        anchor: *session.anchor(),
        sender: network.participants[1].identity,
        contributions: vec![(0, Scalar::rand(&mut rng))],
        signature: LazySignature::default(),
    };
    session.pre_verify_justification(&base).unwrap();

    let mut msg = base.clone();
    msg.contributions.clear();
    assert_eq!(
        session.pre_verify_justification(&msg),
        Err(Error::EmptyJustification)
    );

    // Indexes are bounded by the number of members
    let mut msg = base.clone();
    msg.contributions.push((5, Scalar::rand(&mut rng)));
    assert_eq!(
        session.pre_verify_justification(&msg),
        Err(Error::InvalidIndex(5))
    );

    let mut msg = base.clone();
    msg.contributions.push((0, Scalar::rand(&mut rng)));
    assert_eq!(
        session.pre_verify_justification(&msg),
        Err(Error::DuplicateIndex(0))
    );

    let mut msg = base;
    msg.contributions.push((3, Scalar::zero()));
    assert_eq!(
        session.pre_verify_justification(&msg),
        Err(Error::InvalidShare(3))
    );
}

#[test]
fn test_unprompted_justification() {
    let mut network = setup(14, 5, false, |_| Faults::default());
    network.phase(|s, o| s.contribute(o));
    assert!(network.phase(|s, o| s.verify_and_complain(o)).is_empty());

    let mut rng = StdRng::seed_from_u64(14);
    let mut msg = Justification {
        quorum_type: PARAMS.quorum_type,
        anchor: *network.nodes[0].session.anchor(),
        sender: network.participants[0].identity,
        contributions: vec![(1, Scalar::rand(&mut rng))],
        signature: LazySignature::default(),
    };
    msg.sign(&network.secrets[0]);
    assert_eq!(network.deliver(&[Message::Justification(msg.clone())]), 0);
    for node in &network.nodes {
        assert!(node.session.members()[0].bad);
        assert!(node.session.justification(&msg.digest()).is_some());
        assert!(node.tracker.status().members[0].bad);
    }
}

#[test]
fn test_pre_verify_premature_commitment() {
    let mut network = setup(15, 5, false, |_| Faults::default());
    network.phase(|s, o| s.contribute(o));
    network.phase(|s, o| s.verify_and_complain(o));
    network.phase(|s, o| s.verify_and_justify(o));
    let mut outbox = Vec::new();
    network.nodes[0].session.verify_and_commit(&mut outbox);
    let Some(Message::PrematureCommitment(original)) = outbox.pop() else {
        panic!("no commitment");
    };
    let session = &network.nodes[1].session;
    session.pre_verify_premature_commitment(&original).unwrap();

    let mut msg = original.clone();
    msg.valid_members = BitVec::from_indices(PARAMS.size, [0, 1]);
    assert_eq!(
        session.pre_verify_premature_commitment(&msg),
        Err(Error::NotEnoughValidMembers(2))
    );

    let mut msg = original.clone();
    msg.valid_members = BitVec::ones(PARAMS.size - 1);
    assert_eq!(
        session.pre_verify_premature_commitment(&msg),
        Err(Error::InvalidWidth(PARAMS.size - 1))
    );

    let mut msg = original.clone();
    msg.quorum_signature = LazySignature::from_bytes([0xffu8; 96]);
    assert_eq!(
        session.pre_verify_premature_commitment(&msg),
        Err(Error::InvalidQuorumSignature)
    );

    let mut msg = original;
    msg.signature = LazySignature::default();
    assert_eq!(
        session.pre_verify_premature_commitment(&msg),
        Err(Error::InvalidSignature)
    );
}

#[test]
fn test_valid_bits_beyond_members() {
    // Four members in a quorum of size five
    let mut network = setup(16, 4, false, |_| Faults::default());
    network.phase(|s, o| s.contribute(o));
    network.phase(|s, o| s.verify_and_complain(o));
    network.phase(|s, o| s.verify_and_justify(o));
    let commitments = network.phase(|s, o| s.verify_and_commit(o));
    let Some(Message::PrematureCommitment(original)) = commitments.first() else {
        panic!("no commitment");
    };
    let session = &network.nodes[1].session;
    let mut msg = original.clone();
    msg.valid_members.set(4, true);
    assert_eq!(
        session.pre_verify_premature_commitment(&msg),
        Err(Error::InvalidIndex(4))
    );

    let finals = network
        .nodes
        .iter_mut()
        .map(|node| node.session.finalize_commitments())
        .collect::<Vec<_>>();
    assert_single_final(&network, &finals, &[0, 1, 2, 3], 4);
}

#[test]
fn test_batched_verification() {
    init_tracing();
    let mut network = setup(17, 5, false, |i| {
        if i == 2 {
            Faults::default().with(Fault::ContributionLie, 1.0)
        } else {
            Faults::default()
        }
    });
    let contributed = network.phase(|s, o| s.contribute(o));

    // Replay the contributions into a fresh session that verifies every two
    let participants = network.participants.clone();
    let mut session = Session::new(
        StdRng::seed_from_u64(17),
        Config {
            params: PARAMS,
            anchor: *network.nodes[0].session.anchor(),
            members: participants.clone(),
            operator: Some(Operator {
                identity: participants[0].identity,
                secret: network.nodes[0].secret,
            }),
            worker: Bls::new(1).unwrap(),
            store: Arc::new(Memory::default()),
            cache: Arc::new(Cache::default()),
            reporter: Tracker::default(),
            relay: Vec::new(),
            faults: Faults::default(),
            verify_batch_size: 2,
        },
    )
    .unwrap();
    for (i, msg) in contributions(&contributed).into_iter().enumerate() {
        session.pre_verify_contribution(&msg).unwrap();
        session.receive_contribution(msg);
        // Members 0 and 1 were flushed together, leaving nothing queued
        if i == 1 {
            assert!(session.pending.is_empty());
        }
    }
    assert_eq!(session.pending.len(), 1);
    session.verify_pending_contributions();
    assert!(session.pending.is_empty());
    let complained = session
        .members()
        .iter()
        .filter(|m| m.we_complain)
        .map(|m| m.index)
        .collect::<Vec<_>>();
    assert_eq!(complained, vec![2]);
}

#[test]
fn test_init() {
    let mut rng = StdRng::seed_from_u64(18);
    let participants = (0..6)
        .map(|_| Participant {
            identity: Digest::random(&mut rng),
            operator: keypair(&mut rng).1,
        })
        .collect::<Vec<_>>();
    let config = |members: Vec<Participant>| Config {
        params: PARAMS,
        anchor: Digest::from([1u8; 32]),
        members,
        operator: None,
        worker: Bls::new(1).unwrap(),
        store: Arc::new(Memory::default()),
        cache: Arc::new(Cache::default()),
        reporter: (),
        relay: Vec::<Inventory>::new(),
        faults: Faults::default(),
        verify_batch_size: DEFAULT_VERIFY_BATCH_SIZE,
    };

    let session = Session::new(StdRng::seed_from_u64(0), config(participants[..3].to_vec())).unwrap();
    assert!(!session.is_member());
    assert_eq!(session.local_index(), None);
    assert_eq!(session.phase(), Phase::Initialized);

    assert_eq!(
        Session::new(StdRng::seed_from_u64(0), config(participants[..2].to_vec())).err(),
        Some(Error::NotEnoughMembers(2, 3))
    );
    assert_eq!(
        Session::new(StdRng::seed_from_u64(0), config(participants.clone())).err(),
        Some(Error::TooManyMembers(6, 5))
    );
    let mut duplicated = participants[..3].to_vec();
    duplicated.push(participants[0]);
    assert_eq!(
        Session::new(StdRng::seed_from_u64(0), config(duplicated)).err(),
        Some(Error::DuplicateMember(participants[0].identity))
    );

    let mut invalid = config(participants[..3].to_vec());
    invalid.verify_batch_size = 0;
    assert!(matches!(
        Session::new(StdRng::seed_from_u64(0), invalid).err(),
        Some(Error::InvalidParams(_))
    ));

    // Observers do nothing in any phase
    let mut session = Session::new(StdRng::seed_from_u64(0), config(participants[..4].to_vec())).unwrap();
    let mut outbox = Vec::new();
    session.contribute(&mut outbox);
    session.verify_and_complain(&mut outbox);
    session.verify_and_justify(&mut outbox);
    session.verify_and_commit(&mut outbox);
    assert!(outbox.is_empty());
    assert!(session.finalize_commitments().is_empty());
    assert_eq!(session.phase(), Phase::Finalize);
    assert_eq!(session.relayed().count(), 0);
}

#[test]
fn test_shared_cache() {
    let cache = Arc::new(Cache::default());
    let mut network = setup_with_cache(20, 5, false, |_| Faults::default(), Some(cache));
    let finals = network.run();
    assert_single_final(&network, &finals, &[0, 1, 2, 3, 4], 5);
    for node in &network.nodes {
        assert!(node.session.members().iter().all(|m| !m.bad));
    }
}

/// Signs a complaint from member `sender` with the given bits set.
fn complaint(network: &Network, sender: usize, bad: &[usize], complain_for: &[usize]) -> Message {
    let mut msg = Complaint {
        quorum_type: PARAMS.quorum_type,
        anchor: *network.nodes[0].session.anchor(),
        sender: network.participants[sender].identity,
        bad_members: BitVec::from_indices(PARAMS.size, bad.iter().copied()),
        complain_for_members: BitVec::from_indices(PARAMS.size, complain_for.iter().copied()),
        signature: LazySignature::default(),
    };
    msg.sign(&network.secrets[sender]);
    Message::Complaint(msg)
}

fn relayed_count(session: &TestSession, kind: Kind) -> usize {
    session
        .relayed()
        .filter(|inventory| inventory.kind == kind)
        .count()
}

#[test]
fn test_multiple_complaints() {
    let mut network = setup(21, 5, false, |_| Faults::default());
    network.phase(|s, o| s.contribute(o));
    assert!(network.phase(|s, o| s.verify_and_complain(o)).is_empty());

    let first = complaint(&network, 0, &[], &[2]);
    let second = complaint(&network, 0, &[], &[3]);
    assert_eq!(network.deliver(&[first, second.clone()]), 0);
    let identity = network.participants[0].identity;
    for node in &network.nodes {
        let session = &node.session;
        assert!(session.members()[0].bad);
        assert_eq!(session.members()[0].complaints.len(), 2);
        assert_eq!(relayed_count(session, Kind::Complaint), 2);

        // Only the first complaint counts
        assert!(session.members()[2].complaints_from_others.contains(&identity));
        assert!(!session.members()[3].complaints_from_others.contains(&identity));

        let Message::Complaint(second) = &second else {
            unreachable!();
        };
        let mut third = second.clone();
        third.complain_for_members.set(4, true);
        assert_eq!(
            session.pre_verify_complaint(&third),
            Err(Error::TooManyMessages)
        );
    }
}

#[test]
fn test_multiple_complaints_marked_bad_before_justifying() {
    let mut network = setup(22, 5, false, |_| Faults::default());
    network.phase(|s, o| s.contribute(o));
    assert!(network.phase(|s, o| s.verify_and_complain(o)).is_empty());

    // Member 1 holds two complaints of member 0 without having judged them yet
    let session = &mut network.nodes[1].session;
    session.members[0].complaints.insert(Digest::from([1u8; 32]));
    session.members[0].complaints.insert(Digest::from([2u8; 32]));
    assert!(!session.members()[0].bad);

    let mut outbox = Vec::new();
    session.verify_and_justify(&mut outbox);
    assert!(outbox.is_empty());
    assert!(session.members()[0].bad);
    assert!(network.nodes[1].tracker.status().members[0].bad);
}

#[test]
fn test_multiple_justifications() {
    let mut network = setup(23, 5, false, |i| {
        if i == 0 {
            Faults::default().with(Fault::ContributionLie, 1.0)
        } else {
            Faults::default()
        }
    });
    network.phase(|s, o| s.contribute(o));
    network.phase(|s, o| s.verify_and_complain(o));
    let justifications = network.phase(|s, o| s.verify_and_justify(o));
    let Some(Message::Justification(first)) = justifications.first() else {
        panic!("no justification");
    };
    for node in &network.nodes {
        assert!(!node.session.members()[0].bad);
    }

    // The same dealer reveals again
    let mut second = first.clone();
    second.contributions.truncate(1);
    second.sign(&network.secrets[0]);
    assert_eq!(
        network.deliver(&[Message::Justification(second.clone())]),
        0
    );
    for node in &network.nodes {
        let session = &node.session;
        assert!(session.members()[0].bad);
        assert_eq!(session.members()[0].justifications.len(), 2);
        assert_eq!(relayed_count(session, Kind::Justification), 2);

        let mut third = second.clone();
        third.contributions.clear();
        third.contributions.push(first.contributions[1]);
        assert_eq!(
            session.pre_verify_justification(&third),
            Err(Error::TooManyMessages)
        );
    }
}

#[test]
fn test_bad_votes_threshold() {
    let mut network = setup(24, 5, false, |_| Faults::default());
    network.phase(|s, o| s.contribute(o));
    assert!(network.phase(|s, o| s.verify_and_complain(o)).is_empty());

    // Members 0, 1 and 2 vote member 4 bad although it contributed
    let votes = (0..PARAMS.bad_votes_threshold)
        .map(|sender| complaint(&network, sender, &[4], &[]))
        .collect::<Vec<_>>();
    assert_eq!(network.deliver(&votes), 0);
    for node in &network.nodes {
        let member = &node.session.members()[4];
        assert!(!member.bad);
        assert_eq!(member.bad_member_votes.len(), PARAMS.bad_votes_threshold);
    }

    assert!(network.phase(|s, o| s.verify_and_justify(o)).is_empty());
    for node in &network.nodes {
        assert!(node.session.members()[4].bad);
    }

    // Member 4 still signs the quorum that excludes it
    let finals = network.commit();
    assert_single_final(&network, &finals, &[0, 1, 2, 3], 5);
}

#[test]
fn test_fractured_commitments() {
    let mut network = setup(25, 5, false, |_| Faults::default());
    network.phase(|s, o| s.contribute(o));
    network.phase(|s, o| s.verify_and_complain(o));
    network.phase(|s, o| s.verify_and_justify(o));
    network.phase(|s, o| s.verify_and_commit(o));

    // Members 0, 1 and 2 also commit to a quorum without member 4
    let mut outbox = Vec::new();
    for node in network.nodes.iter_mut().take(3) {
        node.session.mark_bad(4);
        node.session.verify_and_commit(&mut outbox);
    }
    assert_eq!(outbox.len(), 3);
    assert_eq!(network.deliver(&outbox), 0);

    let operators = network.operators();
    let all = BitVec::from_indices(PARAMS.size, 0..5);
    let partial = BitVec::from_indices(PARAMS.size, 0..4);
    let mut expected = None;
    for node in network.nodes.iter_mut() {
        let finals = node.session.finalize_commitments();
        assert_eq!(finals.len(), 2);
        let full = finals.iter().find(|c| c.valid_members == all).unwrap();
        let fractured = finals.iter().find(|c| c.valid_members == partial).unwrap();
        assert_eq!(full.count_signers(), 5);
        assert_eq!(fractured.count_signers(), 3);
        assert_ne!(full.quorum_public_key, fractured.quorum_public_key);
        full.verify(&PARAMS, &operators).unwrap();
        fractured.verify(&PARAMS, &operators).unwrap();
        assert_eq!(node.tracker.status().final_commitments, 2);

        // Every node agrees on both
        match &expected {
            None => expected = Some(finals),
            Some(expected) => assert_eq!(expected, &finals),
        }
    }
}
