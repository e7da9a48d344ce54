//! Serialize quorum DKG messages.
//!
//! # Overview
//!
//! A small binary serialization library used to produce the canonical encoding of every
//! DKG message. The canonical encoding is what gets hashed into signing digests and
//! inventory digests, so it must be stable and bit-exact across implementations.
//!
//! - Fixed-size integers are written big-endian.
//! - Lengths are written as LEB128 varints (restricted to `u32`).
//! - Collections are bounded on read so untrusted input cannot force large allocations.
//!
//! # Example
//!
//! ```
//! use bytes::{Buf, BufMut};
//! use llmq_codec::{DecodeExt, Encode, EncodeSize, Error, Read, ReadExt, Write};
//!
//! #[derive(Debug, PartialEq)]
//! struct Item {
//!     kind: u8,
//!     height: u64,
//! }
//!
//! impl Write for Item {
//!     fn write(&self, buf: &mut impl BufMut) {
//!         self.kind.write(buf);
//!         self.height.write(buf);
//!     }
//! }
//!
//! impl EncodeSize for Item {
//!     fn encode_size(&self) -> usize {
//!         self.kind.encode_size() + self.height.encode_size()
//!     }
//! }
//!
//! impl Read for Item {
//!     type Cfg = ();
//!
//!     fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
//!         let kind = u8::read(buf)?;
//!         let height = u64::read(buf)?;
//!         Ok(Self { kind, height })
//!     }
//! }
//!
//! let item = Item { kind: 1, height: 42 };
//! let encoded = item.encode();
//! assert_eq!(encoded.len(), 9);
//! assert_eq!(Item::decode(encoded).unwrap(), item);
//! ```

pub mod codec;
pub use codec::{Decode, DecodeExt, Encode, EncodeSize, FixedSize, Read, ReadExt, Write};
pub mod error;
pub use error::Error;
pub mod types;
pub mod varint;
