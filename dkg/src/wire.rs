//! Messages exchanged during a session.
//!
//! Every message names its quorum (quorum type and anchor block hash) and its sender (identity
//! hash), and carries an operator signature over its signing hash. The signing hash is the
//! SHA-256 of the encoding of every field but the signature (for a [PrematureCommitment], the
//! commitment hash). The inventory digest of a message is the SHA-256 of its full encoding.
//!
//! Signatures are verified by the caller (in batches) before a message is handed to the
//! session, so they are carried undecoded ([LazySignature]).

use crate::{Error, Params};
use bytes::{Buf, BufMut};
use llmq_codec::{
    DecodeExt, Encode, EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write,
};
use llmq_cryptography::{
    bls12381::{
        ies::EncryptedShares,
        primitives::{
            group::{Private, Public, Scalar, Signature, SIGNATURE_LENGTH},
            ops::{sign_message, verify_message, verify_secure_aggregate},
            poly,
        },
    },
    hash, Digest, Sha256,
};
use llmq_utils::{hex, BitVec};
use std::fmt;

/// An operator or threshold signature, kept in its encoded form until it is needed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LazySignature([u8; SIGNATURE_LENGTH]);

impl LazySignature {
    /// Encodes `signature`.
    pub fn new(signature: &Signature) -> Self {
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes.copy_from_slice(&signature.encode());
        Self(bytes)
    }

    /// Wraps raw bytes (which may not be a valid signature).
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Decodes the signature, returning `None` if it is not a valid point of G2.
    pub fn get(&self) -> Option<Signature> {
        Signature::decode(self.0.as_slice()).ok()
    }
}

impl Default for LazySignature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_LENGTH])
    }
}

impl fmt::Debug for LazySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LazySignature({})", hex(&self.0))
    }
}

impl Write for LazySignature {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl Read for LazySignature {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self(<[u8; SIGNATURE_LENGTH]>::read(buf)?))
    }
}

impl FixedSize for LazySignature {
    const SIZE: usize = SIGNATURE_LENGTH;
}

impl EncodeSize for LazySignature {
    fn encode_size(&self) -> usize {
        Self::SIZE
    }
}

/// Implements signing and hashing for a message with a `signature` field and a `sign_hash`.
macro_rules! impl_signed {
    ($t:ty) => {
        impl $t {
            /// Signs the message with the sender's operator key.
            pub fn sign(&mut self, operator: &Private) {
                let sig = sign_message(operator, &self.sign_hash());
                self.signature = LazySignature::new(&sig);
            }

            /// Verifies the operator signature of the sender.
            pub fn verify_signature(&self, operator: &Public) -> bool {
                let Some(sig) = self.signature.get() else {
                    return false;
                };
                verify_message(operator, &self.sign_hash(), &sig).is_ok()
            }

            /// Returns the inventory digest (hash of the full encoding).
            pub fn digest(&self) -> Digest {
                hash(&self.encode())
            }
        }
    };
}

/// Hashes the fields of a message that are covered by its signature.
fn unsigned_hash(write: impl FnOnce(&mut Vec<u8>)) -> Digest {
    let mut buf = Vec::new();
    write(&mut buf);
    hash(&buf)
}

/// A member's dealing: a commitment to its polynomial and one encrypted share per member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contribution {
    pub quorum_type: u8,
    pub anchor: Digest,
    pub sender: Digest,
    /// Commitment to the dealt polynomial (length `threshold`).
    pub vvec: poly::Public,
    /// Share of every member (in member order), encrypted to its operator key.
    pub shares: EncryptedShares,
    pub signature: LazySignature,
}

impl Contribution {
    fn write_unsigned(&self, buf: &mut impl BufMut) {
        self.quorum_type.write(buf);
        self.anchor.write(buf);
        self.sender.write(buf);
        self.vvec.write(buf);
        self.shares.write(buf);
    }

    /// Returns the hash signed by the sender.
    pub fn sign_hash(&self) -> Digest {
        unsigned_hash(|buf| self.write_unsigned(buf))
    }
}

impl_signed!(Contribution);

impl Write for Contribution {
    fn write(&self, buf: &mut impl BufMut) {
        self.write_unsigned(buf);
        self.signature.write(buf);
    }
}

impl EncodeSize for Contribution {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + Digest::SIZE * 2
            + self.vvec.encode_size()
            + self.shares.encode_size()
            + LazySignature::SIZE
    }
}

/// Contributions are read with the maximum number of members.
impl Read for Contribution {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        Ok(Self {
            quorum_type: u8::read(buf)?,
            anchor: Digest::read(buf)?,
            sender: Digest::read(buf)?,
            vvec: poly::Public::read_cfg(buf, max)?,
            shares: EncryptedShares::read_cfg(buf, max)?,
            signature: LazySignature::read(buf)?,
        })
    }
}

/// A member's view of which members are bad and whose shares did not verify.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Complaint {
    pub quorum_type: u8,
    pub anchor: Digest,
    pub sender: Digest,
    /// Members the sender considers bad.
    pub bad_members: BitVec,
    /// Members whose share to the sender was missing or invalid.
    pub complain_for_members: BitVec,
    pub signature: LazySignature,
}

impl Complaint {
    fn write_unsigned(&self, buf: &mut impl BufMut) {
        self.quorum_type.write(buf);
        self.anchor.write(buf);
        self.sender.write(buf);
        self.bad_members.write(buf);
        self.complain_for_members.write(buf);
    }

    /// Returns the hash signed by the sender.
    pub fn sign_hash(&self) -> Digest {
        unsigned_hash(|buf| self.write_unsigned(buf))
    }
}

impl_signed!(Complaint);

impl Write for Complaint {
    fn write(&self, buf: &mut impl BufMut) {
        self.write_unsigned(buf);
        self.signature.write(buf);
    }
}

impl EncodeSize for Complaint {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + Digest::SIZE * 2
            + self.bad_members.encode_size()
            + self.complain_for_members.encode_size()
            + LazySignature::SIZE
    }
}

/// Complaints are read with the maximum bit-vector width.
impl Read for Complaint {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        Ok(Self {
            quorum_type: u8::read(buf)?,
            anchor: Digest::read(buf)?,
            sender: Digest::read(buf)?,
            bad_members: BitVec::read_cfg(buf, max)?,
            complain_for_members: BitVec::read_cfg(buf, max)?,
            signature: LazySignature::read(buf)?,
        })
    }
}

/// The plaintext shares a member dealt to the members that complained about it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Justification {
    pub quorum_type: u8,
    pub anchor: Digest,
    pub sender: Digest,
    /// `(member index, share)` for every complainer.
    pub contributions: Vec<(u32, Scalar)>,
    pub signature: LazySignature,
}

impl Justification {
    fn write_unsigned(&self, buf: &mut impl BufMut) {
        self.quorum_type.write(buf);
        self.anchor.write(buf);
        self.sender.write(buf);
        self.contributions.write(buf);
    }

    /// Returns the hash signed by the sender.
    pub fn sign_hash(&self) -> Digest {
        unsigned_hash(|buf| self.write_unsigned(buf))
    }
}

impl_signed!(Justification);

impl Write for Justification {
    fn write(&self, buf: &mut impl BufMut) {
        self.write_unsigned(buf);
        self.signature.write(buf);
    }
}

impl EncodeSize for Justification {
    fn encode_size(&self) -> usize {
        u8::SIZE + Digest::SIZE * 2 + self.contributions.encode_size() + LazySignature::SIZE
    }
}

/// Justifications are read with the maximum number of members.
impl Read for Justification {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        Ok(Self {
            quorum_type: u8::read(buf)?,
            anchor: Digest::read(buf)?,
            sender: Digest::read(buf)?,
            contributions: Vec::<(u32, Scalar)>::read_cfg(buf, &(*max, ((), ())))?,
            signature: LazySignature::read(buf)?,
        })
    }
}

/// Returns the hash that every member of a quorum signs to commit to its outcome.
pub fn build_commitment_hash(
    quorum_type: u8,
    anchor: &Digest,
    valid_members: &BitVec,
    quorum_public_key: &Public,
    quorum_vvec_hash: &Digest,
) -> Digest {
    let mut hasher = Sha256::new();
    hasher
        .update(&quorum_type.encode())
        .update(anchor)
        .update(&valid_members.encode())
        .update(&quorum_public_key.encode())
        .update(quorum_vvec_hash);
    hasher.finalize()
}

/// A member's signed view of the outcome of the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrematureCommitment {
    pub quorum_type: u8,
    pub anchor: Digest,
    pub sender: Digest,
    pub valid_members: BitVec,
    pub quorum_public_key: Public,
    pub quorum_vvec_hash: Digest,
    /// Signature over the commitment hash with the sender's share of the quorum key.
    pub quorum_signature: LazySignature,
    /// Signature over the commitment hash with the sender's operator key.
    pub signature: LazySignature,
}

impl PrematureCommitment {
    /// Returns the commitment hash (signed by both signatures).
    pub fn sign_hash(&self) -> Digest {
        build_commitment_hash(
            self.quorum_type,
            &self.anchor,
            &self.valid_members,
            &self.quorum_public_key,
            &self.quorum_vvec_hash,
        )
    }

    /// Returns the number of members the sender considers valid.
    pub fn count_valid_members(&self) -> usize {
        self.valid_members.count_ones()
    }
}

impl_signed!(PrematureCommitment);

impl Write for PrematureCommitment {
    fn write(&self, buf: &mut impl BufMut) {
        self.quorum_type.write(buf);
        self.anchor.write(buf);
        self.sender.write(buf);
        self.valid_members.write(buf);
        self.quorum_public_key.write(buf);
        self.quorum_vvec_hash.write(buf);
        self.quorum_signature.write(buf);
        self.signature.write(buf);
    }
}

impl EncodeSize for PrematureCommitment {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + Digest::SIZE * 3
            + self.valid_members.encode_size()
            + Public::SIZE
            + LazySignature::SIZE * 2
    }
}

/// Premature commitments are read with the maximum bit-vector width.
impl Read for PrematureCommitment {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        Ok(Self {
            quorum_type: u8::read(buf)?,
            anchor: Digest::read(buf)?,
            sender: Digest::read(buf)?,
            valid_members: BitVec::read_cfg(buf, max)?,
            quorum_public_key: Public::read(buf)?,
            quorum_vvec_hash: Digest::read(buf)?,
            quorum_signature: LazySignature::read(buf)?,
            signature: LazySignature::read(buf)?,
        })
    }
}

/// The aggregated outcome of a session, ready to be mined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalCommitment {
    pub quorum_type: u8,
    pub anchor: Digest,
    /// Members whose premature commitment was aggregated.
    pub signers: BitVec,
    pub valid_members: BitVec,
    pub quorum_public_key: Public,
    pub quorum_vvec_hash: Digest,
    /// Threshold signature recovered from the signers' quorum signatures.
    pub quorum_signature: Signature,
    /// Secure aggregate of the signers' operator signatures.
    pub members_signature: Signature,
}

impl FinalCommitment {
    /// Returns the commitment hash signed by the signers.
    pub fn commitment_hash(&self) -> Digest {
        build_commitment_hash(
            self.quorum_type,
            &self.anchor,
            &self.valid_members,
            &self.quorum_public_key,
            &self.quorum_vvec_hash,
        )
    }

    /// Returns the number of signers.
    pub fn count_signers(&self) -> usize {
        self.signers.count_ones()
    }

    /// Returns the number of valid members.
    pub fn count_valid_members(&self) -> usize {
        self.valid_members.count_ones()
    }

    /// Verifies the commitment was produced by at least `min_size` of the quorum members whose
    /// operator keys are provided (in member order).
    pub fn verify(&self, params: &Params, operators: &[Public]) -> Result<(), Error> {
        if self.quorum_type != params.quorum_type {
            return Err(Error::WrongQuorumType(self.quorum_type));
        }
        for bits in [&self.signers, &self.valid_members] {
            if bits.len() != params.size {
                return Err(Error::InvalidWidth(bits.len()));
            }
            if let Some(index) = bits.ones_iter().find(|index| *index >= operators.len()) {
                return Err(Error::InvalidIndex(index));
            }
        }
        let valid = self.count_valid_members();
        if valid < params.min_size {
            return Err(Error::NotEnoughValidMembers(valid));
        }
        let signers = self.count_signers();
        if signers < params.min_size {
            return Err(Error::NotEnoughSigners(signers));
        }

        let hash = self.commitment_hash();
        let publics = self
            .signers
            .ones_iter()
            .map(|index| operators[index])
            .collect::<Vec<_>>();
        verify_secure_aggregate(&publics, &hash, &self.members_signature)
            .map_err(|_| Error::InvalidSignature)?;
        verify_message(&self.quorum_public_key, &hash, &self.quorum_signature)
            .map_err(|_| Error::InvalidQuorumSignature)
    }
}

impl Write for FinalCommitment {
    fn write(&self, buf: &mut impl BufMut) {
        self.quorum_type.write(buf);
        self.anchor.write(buf);
        self.signers.write(buf);
        self.valid_members.write(buf);
        self.quorum_public_key.write(buf);
        self.quorum_vvec_hash.write(buf);
        self.quorum_signature.write(buf);
        self.members_signature.write(buf);
    }
}

impl EncodeSize for FinalCommitment {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + Digest::SIZE * 2
            + self.signers.encode_size()
            + self.valid_members.encode_size()
            + Public::SIZE
            + Signature::SIZE * 2
    }
}

/// Final commitments are read with the maximum bit-vector width.
impl Read for FinalCommitment {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        Ok(Self {
            quorum_type: u8::read(buf)?,
            anchor: Digest::read(buf)?,
            signers: BitVec::read_cfg(buf, max)?,
            valid_members: BitVec::read_cfg(buf, max)?,
            quorum_public_key: Public::read(buf)?,
            quorum_vvec_hash: Digest::read(buf)?,
            quorum_signature: Signature::read(buf)?,
            members_signature: Signature::read(buf)?,
        })
    }
}

/// The kind of message named by an [Inventory].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Kind {
    Contribution = 0,
    Complaint = 1,
    Justification = 2,
    PrematureCommitment = 3,
}

impl Write for Kind {
    fn write(&self, buf: &mut impl BufMut) {
        (*self as u8).write(buf);
    }
}

impl Read for Kind {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        match u8::read(buf)? {
            0 => Ok(Kind::Contribution),
            1 => Ok(Kind::Complaint),
            2 => Ok(Kind::Justification),
            3 => Ok(Kind::PrematureCommitment),
            _ => Err(CodecError::Invalid("Kind", "unknown message kind")),
        }
    }
}

impl FixedSize for Kind {
    const SIZE: usize = u8::SIZE;
}

impl EncodeSize for Kind {
    fn encode_size(&self) -> usize {
        Self::SIZE
    }
}

/// Names a message accepted by a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inventory {
    pub kind: Kind,
    pub digest: Digest,
}

impl Inventory {
    pub fn new(kind: Kind, digest: Digest) -> Self {
        Self { kind, digest }
    }
}

impl Write for Inventory {
    fn write(&self, buf: &mut impl BufMut) {
        self.kind.write(buf);
        self.digest.write(buf);
    }
}

impl Read for Inventory {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self {
            kind: Kind::read(buf)?,
            digest: Digest::read(buf)?,
        })
    }
}

impl FixedSize for Inventory {
    const SIZE: usize = Kind::SIZE + Digest::SIZE;
}

impl EncodeSize for Inventory {
    fn encode_size(&self) -> usize {
        Self::SIZE
    }
}

/// Any message sent by a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Contribution(Contribution),
    Complaint(Complaint),
    Justification(Justification),
    PrematureCommitment(PrematureCommitment),
}

impl Message {
    /// Returns the kind of the message.
    pub fn kind(&self) -> Kind {
        match self {
            Message::Contribution(_) => Kind::Contribution,
            Message::Complaint(_) => Kind::Complaint,
            Message::Justification(_) => Kind::Justification,
            Message::PrematureCommitment(_) => Kind::PrematureCommitment,
        }
    }

    /// Returns the sender of the message.
    pub fn sender(&self) -> &Digest {
        match self {
            Message::Contribution(msg) => &msg.sender,
            Message::Complaint(msg) => &msg.sender,
            Message::Justification(msg) => &msg.sender,
            Message::PrematureCommitment(msg) => &msg.sender,
        }
    }

    /// Returns the inventory naming the message.
    pub fn inventory(&self) -> Inventory {
        let digest = match self {
            Message::Contribution(msg) => msg.digest(),
            Message::Complaint(msg) => msg.digest(),
            Message::Justification(msg) => msg.digest(),
            Message::PrematureCommitment(msg) => msg.digest(),
        };
        Inventory::new(self.kind(), digest)
    }

    /// Verifies the operator signature of the sender.
    pub fn verify_signature(&self, operator: &Public) -> bool {
        match self {
            Message::Contribution(msg) => msg.verify_signature(operator),
            Message::Complaint(msg) => msg.verify_signature(operator),
            Message::Justification(msg) => msg.verify_signature(operator),
            Message::PrematureCommitment(msg) => msg.verify_signature(operator),
        }
    }
}

impl Write for Message {
    fn write(&self, buf: &mut impl BufMut) {
        self.kind().write(buf);
        match self {
            Message::Contribution(msg) => msg.write(buf),
            Message::Complaint(msg) => msg.write(buf),
            Message::Justification(msg) => msg.write(buf),
            Message::PrematureCommitment(msg) => msg.write(buf),
        }
    }
}

impl EncodeSize for Message {
    fn encode_size(&self) -> usize {
        Kind::SIZE
            + match self {
                Message::Contribution(msg) => msg.encode_size(),
                Message::Complaint(msg) => msg.encode_size(),
                Message::Justification(msg) => msg.encode_size(),
                Message::PrematureCommitment(msg) => msg.encode_size(),
            }
    }
}

/// Messages are read with the maximum number of members.
impl Read for Message {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        Ok(match Kind::read(buf)? {
            Kind::Contribution => Message::Contribution(Contribution::read_cfg(buf, max)?),
            Kind::Complaint => Message::Complaint(Complaint::read_cfg(buf, max)?),
            Kind::Justification => Message::Justification(Justification::read_cfg(buf, max)?),
            Kind::PrematureCommitment => {
                Message::PrematureCommitment(PrematureCommitment::read_cfg(buf, max)?)
            }
        })
    }
}
