//! Variable-length length prefixes.
//!
//! Lengths are encoded as unsigned LEB128: each byte carries 7 bits of the value and
//! a continuation bit. Values are restricted to `u32` so the encoding is identical on
//! 32-bit and 64-bit targets.

use crate::Error;
use bytes::{Buf, BufMut};

const DATA_BITS_PER_BYTE: u32 = 7;
const DATA_BITS_MASK: u8 = 0x7F;
const CONTINUATION_BIT_MASK: u8 = 0x80;

/// Maximum number of bytes a `u32` varint may occupy.
const MAX_BYTES: usize = 5;

/// Writes `value` as a varint.
pub fn write(mut value: u32, buf: &mut impl BufMut) {
    while value >= CONTINUATION_BIT_MASK as u32 {
        buf.put_u8((value as u8 & DATA_BITS_MASK) | CONTINUATION_BIT_MASK);
        value >>= DATA_BITS_PER_BYTE;
    }
    buf.put_u8(value as u8);
}

/// Reads a varint, rejecting overlong or overflowing encodings.
pub fn read(buf: &mut impl Buf) -> Result<u32, Error> {
    let mut result: u64 = 0;
    for i in 0..MAX_BYTES {
        if !buf.has_remaining() {
            return Err(Error::EndOfBuffer);
        }
        let byte = buf.get_u8();

        // A trailing zero byte means the value was not minimally encoded
        if i > 0 && byte == 0 {
            return Err(Error::InvalidVarint);
        }
        result |= ((byte & DATA_BITS_MASK) as u64) << (DATA_BITS_PER_BYTE * i as u32);
        if byte & CONTINUATION_BIT_MASK == 0 {
            return u32::try_from(result).map_err(|_| Error::InvalidVarint);
        }
    }
    Err(Error::InvalidVarint)
}

/// Returns the number of bytes `value` occupies once encoded.
pub fn size(value: u32) -> usize {
    let bits = u32::BITS - value.leading_zeros();
    (bits.max(1) as usize).div_ceil(DATA_BITS_PER_BYTE as usize)
}
