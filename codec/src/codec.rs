//! Core codec traits.

use crate::error::Error;
use bytes::{Buf, BufMut, BytesMut};

/// Types that can be written (encoded) to a buffer.
pub trait Write {
    /// Encodes this value by writing to a buffer.
    ///
    /// Implementations may panic if the buffer does not have enough capacity.
    fn write(&self, buf: &mut impl BufMut);
}

/// Types that know the exact number of bytes [Write::write] will produce.
pub trait EncodeSize {
    /// Returns the encoded length of this value.
    fn encode_size(&self) -> usize;
}

/// Types with a constant encoded size.
pub trait FixedSize {
    /// The length of the encoded value.
    const SIZE: usize;
}

/// Types that can be read (decoded) from a buffer.
///
/// `Cfg` bounds the decoding of untrusted data (i.e. the maximum length of a
/// collection or the expected width of a bit-vector).
pub trait Read: Sized {
    /// Configuration required to read the value.
    type Cfg;

    /// Reads a value from the buffer, consuming the necessary bytes.
    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, Error>;
}

/// Types that can be encoded into a contiguous buffer.
pub trait Encode: Write + EncodeSize {
    /// Encodes the value into a new [BytesMut].
    ///
    /// Panics if [Write::write] does not write exactly [EncodeSize::encode_size] bytes.
    fn encode(&self) -> BytesMut {
        let len = self.encode_size();
        let mut buffer = BytesMut::with_capacity(len);
        self.write(&mut buffer);
        assert_eq!(buffer.len(), len, "write() did not write expected bytes");
        buffer
    }
}

impl<T: Write + EncodeSize> Encode for T {}

/// Types that can be decoded from a buffer that must be fully consumed.
pub trait Decode: Read {
    /// Decodes a value, failing if any bytes remain afterwards.
    fn decode_cfg(mut buf: impl Buf, cfg: &Self::Cfg) -> Result<Self, Error> {
        let result = Self::read_cfg(&mut buf, cfg)?;
        let remaining = buf.remaining();
        if remaining > 0 {
            return Err(Error::ExtraData(remaining));
        }
        Ok(result)
    }
}

impl<T: Read> Decode for T {}

/// Ergonomic read for types that need no configuration.
pub trait ReadExt: Read<Cfg = ()> {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Self::read_cfg(buf, &())
    }
}

impl<T: Read<Cfg = ()>> ReadExt for T {}

/// Ergonomic decode for types that need no configuration.
pub trait DecodeExt: Decode<Cfg = ()> {
    fn decode(buf: impl Buf) -> Result<Self, Error> {
        Self::decode_cfg(buf, &())
    }
}

impl<T: Decode<Cfg = ()>> DecodeExt for T {}

/// Ensures the buffer holds at least `len` more bytes.
#[inline]
pub fn at_least(buf: &impl Buf, len: usize) -> Result<(), Error> {
    if buf.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_insufficient_buffer() {
        let mut reader = Bytes::from_static(&[0x01, 0x02]);
        assert!(matches!(u32::read(&mut reader), Err(Error::EndOfBuffer)));
    }

    #[test]
    fn test_extra_data() {
        let encoded = Bytes::from_static(&[0x01, 0x02]);
        assert!(matches!(u8::decode(encoded), Err(Error::ExtraData(1))));
    }

    #[test]
    fn test_encode_size_matches() {
        let value = 0xdead_beef_u32;
        let encoded = value.encode();
        assert_eq!(encoded.len(), u32::SIZE);
        assert_eq!(u32::decode(encoded).unwrap(), value);
    }
}
