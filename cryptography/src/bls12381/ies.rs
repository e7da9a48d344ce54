//! Encrypt secret shares to many recipients at once (IES).
//!
//! A dealer draws a single ephemeral keypair per message and derives, for every recipient, a
//! symmetric key from the Diffie-Hellman point `ephemeral_private * recipient_public` in G1.
//! Each share is then sealed with ChaCha20-Poly1305 under a fresh random nonce. The recipient's
//! position is bound as associated data so blobs cannot be swapped between recipients.

use super::primitives::{
    group::{Element, Private, Public, Scalar, SCALAR_LENGTH},
    ops::keypair,
};
use crate::Sha256;
use bytes::{Buf, BufMut};
use chacha20poly1305::{
    aead::{generic_array::typenum::Unsigned, Aead, Payload},
    AeadCore, ChaCha20Poly1305, KeyInit as _, Nonce,
};
use llmq_codec::{
    DecodeExt, Encode, EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write,
};
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use zeroize::Zeroize;

/// How many bytes are in a nonce.
const NONCE_LENGTH: usize = <ChaCha20Poly1305 as AeadCore>::NonceSize::USIZE;

/// The amount of overhead in a ciphertext, compared to the plain share.
const TAG_LENGTH: usize = <ChaCha20Poly1305 as AeadCore>::TagSize::USIZE;

/// Length of a single recipient's blob (`nonce || ciphertext || tag`).
pub const BLOB_LENGTH: usize = NONCE_LENGTH + SCALAR_LENGTH + TAG_LENGTH;

/// Domain separation for the symmetric key derivation.
const KDF_NAMESPACE: &[u8] = b"LLMQ_IES_SHARE";

/// Errors that can occur when sealing or opening shares.
#[derive(Error, Debug)]
pub enum Error {
    #[error("mismatched lengths: {0} recipients, {1} shares")]
    MismatchedLengths(usize, usize),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("no blob for recipient {0}")]
    MissingBlob(usize),
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("decrypted share is invalid")]
    InvalidShare,
}

/// Secret shares sealed to a list of recipients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedShares {
    /// The dealer's ephemeral public key.
    pub ephemeral: Public,
    /// One blob per recipient, in recipient order.
    pub blobs: Vec<[u8; BLOB_LENGTH]>,
}

fn cipher(shared: &Public) -> ChaCha20Poly1305 {
    let mut hasher = Sha256::new();
    hasher.update(KDF_NAMESPACE).update(&shared.encode());
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    let cipher = ChaCha20Poly1305::new(&key.into());
    key.zeroize();
    cipher
}

impl EncryptedShares {
    /// Seals `shares[i]` to `recipients[i]`.
    pub fn encrypt<R: RngCore + CryptoRng>(
        rng: &mut R,
        recipients: &[Public],
        shares: &[Private],
    ) -> Result<Self, Error> {
        if recipients.len() != shares.len() {
            return Err(Error::MismatchedLengths(recipients.len(), shares.len()));
        }
        let (mut ephemeral_private, ephemeral) = keypair(rng);

        let mut blobs = Vec::with_capacity(recipients.len());
        for (index, (recipient, share)) in recipients.iter().zip(shares).enumerate() {
            let mut shared = *recipient;
            shared.mul(&ephemeral_private);

            let mut nonce = [0u8; NONCE_LENGTH];
            rng.fill_bytes(&mut nonce);
            let mut plaintext = [0u8; SCALAR_LENGTH];
            plaintext.copy_from_slice(&share.encode());
            let aad = (index as u32).to_be_bytes();
            let sealed = cipher(&shared).encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: &aad,
                },
            );
            plaintext.zeroize();
            let sealed = sealed.map_err(|_| Error::EncryptionFailed)?;

            let mut blob = [0u8; BLOB_LENGTH];
            blob[..NONCE_LENGTH].copy_from_slice(&nonce);
            blob[NONCE_LENGTH..].copy_from_slice(&sealed);
            blobs.push(blob);
        }
        ephemeral_private.zeroize();

        Ok(Self { ephemeral, blobs })
    }

    /// Opens the blob addressed to the recipient at `index`, who holds `private`.
    pub fn decrypt(&self, index: usize, private: &Private) -> Result<Scalar, Error> {
        let blob = self.blobs.get(index).ok_or(Error::MissingBlob(index))?;
        let mut shared = self.ephemeral;
        shared.mul(private);

        let aad = (index as u32).to_be_bytes();
        let mut plaintext = cipher(&shared)
            .decrypt(
                Nonce::from_slice(&blob[..NONCE_LENGTH]),
                Payload {
                    msg: &blob[NONCE_LENGTH..],
                    aad: &aad,
                },
            )
            .map_err(|_| Error::DecryptionFailed)?;
        let share = Scalar::decode(plaintext.as_slice()).map_err(|_| Error::InvalidShare);
        plaintext.zeroize();
        share
    }

    /// Returns the number of recipients.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Returns true if there are no recipients.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl Write for EncryptedShares {
    fn write(&self, buf: &mut impl BufMut) {
        self.ephemeral.write(buf);
        self.blobs.write(buf);
    }
}

impl EncodeSize for EncryptedShares {
    fn encode_size(&self) -> usize {
        Public::SIZE + self.blobs.encode_size()
    }
}

/// Read with the maximum number of recipients.
impl Read for EncryptedShares {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        let ephemeral = Public::read(buf)?;
        let blobs = Vec::<[u8; BLOB_LENGTH]>::read_cfg(buf, &(*max, ()))?;
        Ok(Self { ephemeral, blobs })
    }
}
