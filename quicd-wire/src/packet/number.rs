//! # Packet Number Encoding/Decoding (RFC 9000 Section 17.1)
//!
//! Packet numbers use **truncated encoding** to minimize overhead. Instead of sending
//! the full 62-bit value, QUIC encodes only the least significant bits needed to
//! disambiguate the packet number from recently received packets.
//!
//! ## Encoding Algorithm (RFC 9000 Section A.2)
//!
//! ```text
//! Given:
//! - full_pn: The full packet number to encode
//! - largest_acked: The largest packet number acknowledged by the peer
//!
//! The encoder:
//! 1. Computes the number of unacknowledged packets in flight
//! 2. Takes log2 of that plus one bit so the peer can tell the
//!    packet apart from older ones still in flight
//! 3. Rounds up to 8, 16, 24, or 32 bits (1-4 bytes)
//! 4. Encodes only those least significant bits
//! ```
//!
//! ## Decoding Algorithm (RFC 9000 Section A.3)
//!
//! ```text
//! Given:
//! - truncated_pn: The truncated packet number from the packet header
//! - pn_nbits: Number of bits in truncated_pn (8, 16, 24, or 32)
//! - expected_pn: The next expected packet number (largest_received + 1)
//!
//! The decoder:
//! 1. Finds the candidate full packet number closest to expected_pn
//! 2. Ensures the candidate is within the valid window
//! ```

#![forbid(unsafe_code)]

use crate::error::{Error, Result};
use crate::types::{PacketNumber, MAX_PACKET_NUMBER};
use bytes::BufMut;

/// Packet Number Length Mask (bottom 2 bits of the first header byte)
/// Encodes (packet_number_length - 1)
pub const PACKET_NUMBER_LENGTH_MASK: u8 = 0x03;

/// Width of an encoded packet number, 1 to 4 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketNumberLength(u8);

impl PacketNumberLength {
    pub const ONE: PacketNumberLength = PacketNumberLength(1);
    pub const TWO: PacketNumberLength = PacketNumberLength(2);
    pub const THREE: PacketNumberLength = PacketNumberLength(3);
    pub const FOUR: PacketNumberLength = PacketNumberLength(4);

    /// Construct from a byte count, `None` outside 1..=4
    pub fn new(bytes: usize) -> Option<Self> {
        match bytes {
            1..=4 => Some(PacketNumberLength(bytes as u8)),
            _ => None,
        }
    }

    /// Decode from the low two bits of an unprotected first header byte
    pub fn from_first_byte(first_byte: u8) -> Self {
        PacketNumberLength((first_byte & PACKET_NUMBER_LENGTH_MASK) + 1)
    }

    /// Value of the two-bit length field
    pub fn first_byte_bits(self) -> u8 {
        self.0 - 1
    }

    pub fn len(self) -> usize {
        self.0 as usize
    }

    pub fn bits(self) -> u64 {
        self.0 as u64 * 8
    }
}

/// Encoded length for `full_pn` (RFC 9000 Appendix A.2)
///
/// `largest_acked` is `None` until the peer has acknowledged anything in the
/// packet number space.
pub fn encode_length(full_pn: PacketNumber, largest_acked: Option<PacketNumber>) -> PacketNumberLength {
    let num_unacked = match largest_acked {
        Some(largest) => full_pn.saturating_sub(largest),
        None => full_pn.saturating_add(1),
    };

    // log2(num_unacked) + 1, rounded up to whole bytes
    let bit_len = 64 - num_unacked.leading_zeros() as usize;
    let min_bits = if num_unacked.is_power_of_two() {
        bit_len
    } else {
        bit_len + 1
    };

    PacketNumberLength(min_bits.div_ceil(8).clamp(1, 4) as u8)
}

/// Truncate `full_pn` to `len` bytes and append it big-endian to `buf`.
pub fn write_truncated<B: BufMut>(buf: &mut B, full_pn: PacketNumber, len: PacketNumberLength) {
    buf.put_slice(&full_pn.to_be_bytes()[8 - len.len()..]);
}

/// Encode a packet number, returning the truncated big-endian bytes.
pub fn encode(full_pn: PacketNumber, largest_acked: Option<PacketNumber>) -> Vec<u8> {
    let len = encode_length(full_pn, largest_acked);
    let mut out = Vec::with_capacity(len.len());
    write_truncated(&mut out, full_pn, len);
    out
}

/// Read a big-endian truncated packet number of `len` bytes.
pub fn read_truncated(bytes: &[u8], len: PacketNumberLength) -> Option<u64> {
    let field = bytes.get(..len.len())?;
    Some(field.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

/// Decode a truncated packet number to its full value (RFC 9000 Appendix A.3)
///
/// # Arguments
/// * `largest_pn` - The largest packet number successfully processed in this
///   space, `None` before the first one
/// * `truncated_pn` - The truncated packet number from the packet header
/// * `pn_nbits` - Number of bits in the truncated encoding (8, 16, 24, or 32)
///
/// # Errors
/// Returns an error if `pn_nbits` is not 8, 16, 24, or 32.
pub fn decode(
    largest_pn: Option<PacketNumber>,
    truncated_pn: u64,
    pn_nbits: u64,
) -> Result<PacketNumber> {
    if !matches!(pn_nbits, 8 | 16 | 24 | 32) {
        return Err(Error::MalformedPacket("invalid packet number length"));
    }

    let expected_pn = largest_pn.map_or(0, |largest| largest + 1);
    let pn_win = 1u64 << pn_nbits;
    let pn_hwin = pn_win / 2;
    let pn_mask = pn_win - 1;

    let candidate = (expected_pn & !pn_mask) | (truncated_pn & pn_mask);

    if candidate + pn_hwin <= expected_pn && candidate < (MAX_PACKET_NUMBER + 1) - pn_win {
        Ok(candidate + pn_win)
    } else if candidate > expected_pn + pn_hwin && candidate >= pn_win {
        Ok(candidate - pn_win)
    } else {
        Ok(candidate)
    }
}
