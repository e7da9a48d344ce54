//! Codec implementations for primitives and collections.

use crate::{codec::at_least, varint, EncodeSize, Error, FixedSize, Read, Write};
use bytes::{Buf, BufMut};

macro_rules! impl_numeric {
    ($type:ty, $read_method:ident, $write_method:ident) => {
        impl Write for $type {
            #[inline]
            fn write(&self, buf: &mut impl BufMut) {
                buf.$write_method(*self);
            }
        }

        impl Read for $type {
            type Cfg = ();

            #[inline]
            fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
                at_least(buf, std::mem::size_of::<$type>())?;
                Ok(buf.$read_method())
            }
        }

        impl FixedSize for $type {
            const SIZE: usize = std::mem::size_of::<$type>();
        }

        impl EncodeSize for $type {
            #[inline]
            fn encode_size(&self) -> usize {
                Self::SIZE
            }
        }
    };
}

impl_numeric!(u8, get_u8, put_u8);
impl_numeric!(u16, get_u16, put_u16);
impl_numeric!(u32, get_u32, put_u32);
impl_numeric!(u64, get_u64, put_u64);

impl Write for bool {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(u8::from(*self));
    }
}

impl Read for bool {
    type Cfg = ();

    #[inline]
    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        at_least(buf, 1)?;
        match buf.get_u8() {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::InvalidBool),
        }
    }
}

impl FixedSize for bool {
    const SIZE: usize = 1;
}

impl EncodeSize for bool {
    #[inline]
    fn encode_size(&self) -> usize {
        Self::SIZE
    }
}

impl<const N: usize> Write for [u8; N] {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(self);
    }
}

impl<const N: usize> Read for [u8; N] {
    type Cfg = ();

    #[inline]
    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        at_least(buf, N)?;
        let mut array = [0u8; N];
        buf.copy_to_slice(&mut array);
        Ok(array)
    }
}

impl<const N: usize> FixedSize for [u8; N] {
    const SIZE: usize = N;
}

impl<const N: usize> EncodeSize for [u8; N] {
    #[inline]
    fn encode_size(&self) -> usize {
        N
    }
}

/// Writes a collection length prefix.
#[inline]
pub fn write_len(len: usize, buf: &mut impl BufMut) {
    let len = u32::try_from(len).expect("length exceeds u32");
    varint::write(len, buf);
}

/// Reads a collection length prefix, rejecting values above `max`.
#[inline]
pub fn read_len(buf: &mut impl Buf, max: usize) -> Result<usize, Error> {
    let len = varint::read(buf)? as usize;
    if len > max {
        return Err(Error::InvalidLength(len));
    }
    Ok(len)
}

/// Returns the encoded size of a collection length prefix.
#[inline]
pub fn len_size(len: usize) -> usize {
    varint::size(u32::try_from(len).expect("length exceeds u32"))
}

impl<T: Write> Write for Vec<T> {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        write_len(self.len(), buf);
        for item in self {
            item.write(buf);
        }
    }
}

impl<T: EncodeSize> EncodeSize for Vec<T> {
    #[inline]
    fn encode_size(&self) -> usize {
        len_size(self.len()) + self.iter().map(EncodeSize::encode_size).sum::<usize>()
    }
}

/// Vectors are read with `(max length, item config)`.
impl<T: Read> Read for Vec<T> {
    type Cfg = (usize, T::Cfg);

    fn read_cfg(buf: &mut impl Buf, (max, cfg): &Self::Cfg) -> Result<Self, Error> {
        let len = read_len(buf, *max)?;

        // Never trust the prefix for preallocation beyond what the buffer could hold
        let mut items = Vec::with_capacity(len.min(buf.remaining()));
        for _ in 0..len {
            items.push(T::read_cfg(buf, cfg)?);
        }
        Ok(items)
    }
}

impl<A: Write, B: Write> Write for (A, B) {
    #[inline]
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
        self.1.write(buf);
    }
}

impl<A: EncodeSize, B: EncodeSize> EncodeSize for (A, B) {
    #[inline]
    fn encode_size(&self) -> usize {
        self.0.encode_size() + self.1.encode_size()
    }
}

impl<A: Read, B: Read> Read for (A, B) {
    type Cfg = (A::Cfg, B::Cfg);

    #[inline]
    fn read_cfg(buf: &mut impl Buf, (a, b): &Self::Cfg) -> Result<Self, Error> {
        Ok((A::read_cfg(buf, a)?, B::read_cfg(buf, b)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Decode, DecodeExt, Encode};
    use bytes::Bytes;

    #[test]
    fn test_numerics_big_endian() {
        assert_eq!(0x0102_u16.encode().as_ref(), &[0x01, 0x02]);
        assert_eq!(
            0x0102_0304_u32.encode().as_ref(),
            &[0x01, 0x02, 0x03, 0x04]
        );
        assert_eq!(u64::decode(7u64.encode()).unwrap(), 7);
    }

    #[test]
    fn test_bool() {
        assert!(bool::decode(true.encode()).unwrap());
        assert!(!bool::decode(false.encode()).unwrap());
        assert!(matches!(
            bool::decode(Bytes::from_static(&[2])),
            Err(Error::InvalidBool)
        ));
    }

    #[test]
    fn test_vec_bounds() {
        let value = vec![1u8, 2, 3];
        let encoded = value.encode();
        assert_eq!(encoded.len(), 4);
        assert_eq!(
            Vec::<u8>::decode_cfg(encoded.clone(), &(3, ())).unwrap(),
            value
        );
        assert!(matches!(
            Vec::<u8>::decode_cfg(encoded, &(2, ())),
            Err(Error::InvalidLength(3))
        ));
    }

    #[test]
    fn test_vec_of_pairs() {
        let value = vec![(1u32, [9u8; 4]), (2u32, [8u8; 4])];
        let encoded = value.encode();
        assert_eq!(encoded.len(), 1 + 2 * 8);
        let decoded = Vec::<(u32, [u8; 4])>::decode_cfg(encoded, &(2, ((), ()))).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_truncated_vec() {
        // Claims two items but only carries one
        let encoded = Bytes::from_static(&[2, 7]);
        assert!(matches!(
            Vec::<u8>::decode_cfg(encoded, &(10, ())),
            Err(Error::EndOfBuffer)
        ));
    }
}
