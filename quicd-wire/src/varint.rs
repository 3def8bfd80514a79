//! # Variable-Length Integer Encoding (RFC 9000 Section 16)
//!
//! The two most significant bits of the first byte select the encoded
//! length: 00=1 byte, 01=2 bytes, 10=4 bytes, 11=8 bytes. The remaining bits
//! carry the value in network byte order, so the largest representable value
//! is 2^62 - 1.

#![forbid(unsafe_code)]

use crate::error::{Error, Result};
use bytes::BufMut;

/// Maximum value for VarInt (2^62 - 1)
pub const VARINT_MAX: u64 = (1u64 << 62) - 1;

/// Variable-Length Integer (RFC 9000 Section 16)
///
/// Construction rejects values that do not fit in 62 bits, so every
/// `VarInt` can be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VarInt(u64);

impl VarInt {
    /// Largest representable value
    pub const MAX: VarInt = VarInt(VARINT_MAX);

    /// Zero
    pub const ZERO: VarInt = VarInt(0);

    /// Create a VarInt, rejecting values of 2^62 and above
    pub fn new(value: u64) -> Result<Self> {
        if value > VARINT_MAX {
            return Err(Error::VarIntOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Infallible construction from a u32
    pub const fn from_u32(value: u32) -> Self {
        Self(value as u64)
    }

    /// Raw value
    pub const fn into_inner(self) -> u64 {
        self.0
    }

    /// Minimal encoded size in bytes
    pub fn encoded_len(self) -> usize {
        varint_len(self.0)
    }

    /// Encode using the minimal length class
    pub fn encode<B: BufMut>(self, buf: &mut B) {
        write_with_len(self.0, self.encoded_len(), buf);
    }

    /// Encode using at least `min_bytes` bytes.
    ///
    /// The smallest length class covering both the value and `min_bytes` is
    /// chosen, so a wider tag pads the value without changing it. Asking for
    /// more than 8 bytes is an error because no tag class is that wide.
    pub fn encode_with_min<B: BufMut>(self, min_bytes: usize, buf: &mut B) -> Result<usize> {
        let len = match min_bytes.max(self.encoded_len()) {
            0 | 1 => 1,
            2 => 2,
            3 | 4 => 4,
            5..=8 => 8,
            _ => return Err(Error::VarIntOutOfRange(min_bytes as u64)),
        };
        write_with_len(self.0, len, buf);
        Ok(len)
    }

    /// Decode from the front of `buf`, returning the value and the number of
    /// bytes consumed. `None` means more bytes are needed.
    pub fn decode(buf: &[u8]) -> Option<(VarInt, usize)> {
        let first = *buf.first()?;
        let len = 1usize << (first >> 6);
        if buf.len() < len {
            return None;
        }

        let mut value = (first & 0x3f) as u64;
        for &byte in &buf[1..len] {
            value = (value << 8) | byte as u64;
        }
        Some((VarInt(value), len))
    }
}

impl From<VarInt> for u64 {
    fn from(v: VarInt) -> u64 {
        v.0
    }
}

impl From<u32> for VarInt {
    fn from(v: u32) -> Self {
        VarInt::from_u32(v)
    }
}

impl TryFrom<u64> for VarInt {
    type Error = Error;

    fn try_from(v: u64) -> Result<Self> {
        VarInt::new(v)
    }
}

impl std::fmt::Display for VarInt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Encoded size of a raw value. Values above [`VARINT_MAX`] report 8 and are
/// rejected by [`put_varint`].
pub fn varint_len(value: u64) -> usize {
    if value < 0x40 {
        1
    } else if value < 0x4000 {
        2
    } else if value < 0x4000_0000 {
        4
    } else {
        8
    }
}

/// Append a raw value as a VarInt, validating the range.
pub fn put_varint<B: BufMut>(buf: &mut B, value: u64) -> Result<()> {
    VarInt::new(value)?.encode(buf);
    Ok(())
}

/// Decode a raw VarInt value from `buf` at `*offset`, advancing the offset.
pub(crate) fn read_varint(buf: &[u8], offset: &mut usize) -> Option<u64> {
    let (value, consumed) = VarInt::decode(buf.get(*offset..)?)?;
    *offset += consumed;
    Some(value.into_inner())
}

fn write_with_len<B: BufMut>(value: u64, len: usize, buf: &mut B) {
    let tag: u64 = match len {
        1 => 0b00,
        2 => 0b01,
        4 => 0b10,
        _ => 0b11,
    };
    let tagged = value | (tag << (len * 8 - 2));
    buf.put_slice(&tagged.to_be_bytes()[8 - len..]);
}
