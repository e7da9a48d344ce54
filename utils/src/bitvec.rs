//! Fixed-width bit-vector
//!
//! Every bit-vector carried by a DKG message is sized to the quorum's configured `size`, which
//! may be larger than the number of members actually participating. Bits are packed into [u8]
//! blocks, least-significant bit first. An invariant of the implementation is that any bits in
//! the last block that are not part of the vector are set to 0 (so two vectors with the same set
//! bits always compare, hash and encode identically).

use bytes::{Buf, BufMut};
use llmq_codec::{
    types::{len_size, read_len, write_len},
    EncodeSize, Error as CodecError, Read, ReadExt, Write,
};
use std::fmt::{self, Formatter};

/// Type alias for the underlying block type.
type Block = u8;

/// Number of bits in a [Block].
const BITS_PER_BLOCK: usize = Block::BITS as usize;

/// Represents a vector of bits.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitVec {
    /// The underlying storage for the bits.
    storage: Vec<Block>,
    /// The total number of bits
    num_bits: usize,
}

impl BitVec {
    /// Creates a new `BitVec` with `size` bits, all initialized to zero.
    #[inline]
    pub fn zeroes(size: usize) -> Self {
        Self {
            storage: vec![0; Self::num_blocks(size)],
            num_bits: size,
        }
    }

    /// Creates a new `BitVec` with `size` bits, all initialized to one.
    pub fn ones(size: usize) -> Self {
        let mut result = Self::zeroes(size);
        for index in 0..size {
            result.set(index, true);
        }
        result
    }

    /// Creates a `BitVec` of `size` bits from an iterator of set positions.
    ///
    /// # Panics
    ///
    /// Panics if any position is out of bounds.
    pub fn from_indices(size: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut result = Self::zeroes(size);
        for index in indices {
            result.set(index, true);
        }
        result
    }

    /// Returns the number of bits in the vector.
    #[inline]
    pub fn len(&self) -> usize {
        self.num_bits
    }

    /// Returns true if the vector contains no bits.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Gets the value of the bit at `index`.
    ///
    /// Positions outside the vector read as unset.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        if index >= self.num_bits {
            return false;
        }
        self.storage[Self::block_index(index)] & Self::bit_mask(index) != 0
    }

    /// Sets the bit at `index` to `value`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        assert!(index < self.num_bits, "index out of bounds");
        let block = &mut self.storage[Self::block_index(index)];
        if value {
            *block |= Self::bit_mask(index);
        } else {
            *block &= !Self::bit_mask(index);
        }
    }

    /// Returns the number of bits set to 1.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.storage
            .iter()
            .map(|block| block.count_ones() as usize)
            .sum()
    }

    /// Returns true if any bit is set.
    #[inline]
    pub fn any(&self) -> bool {
        self.storage.iter().any(|block| *block != 0)
    }

    /// Returns an iterator over all bits.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.num_bits).map(|index| self.get(index))
    }

    /// Returns an iterator over the positions of all set bits.
    pub fn ones_iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_bits).filter(|index| self.get(*index))
    }

    /// Calculates the number of blocks needed to store `num_bits` bits.
    #[inline]
    fn num_blocks(num_bits: usize) -> usize {
        num_bits.div_ceil(BITS_PER_BLOCK)
    }

    #[inline]
    fn block_index(index: usize) -> usize {
        index / BITS_PER_BLOCK
    }

    #[inline]
    fn bit_mask(index: usize) -> Block {
        1 << (index % BITS_PER_BLOCK)
    }
}

impl fmt::Debug for BitVec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "BitVec[")?;
        for bit in self.iter() {
            write!(f, "{}", if bit { '1' } else { '0' })?;
        }
        write!(f, "]")
    }
}

impl Write for BitVec {
    fn write(&self, buf: &mut impl BufMut) {
        write_len(self.num_bits, buf);
        for &block in &self.storage {
            block.write(buf);
        }
    }
}

impl EncodeSize for BitVec {
    fn encode_size(&self) -> usize {
        len_size(self.num_bits) + self.storage.len()
    }
}

/// Bit-vectors are read with the maximum width accepted.
impl Read for BitVec {
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        let num_bits = read_len(buf, *max)?;

        let num_blocks = Self::num_blocks(num_bits);
        let mut storage = Vec::with_capacity(num_blocks);
        for _ in 0..num_blocks {
            storage.push(Block::read(buf)?);
        }

        // Ensure there were no trailing bits
        let trailing = num_bits % BITS_PER_BLOCK;
        if trailing != 0 {
            let last = storage[num_blocks - 1];
            if last >> trailing != 0 {
                return Err(CodecError::Invalid("BitVec", "trailing bits set"));
            }
        }
        Ok(Self { storage, num_bits })
    }
}
