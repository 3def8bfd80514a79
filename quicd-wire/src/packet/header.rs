//! # QUIC Packet Headers (RFC 9000 Section 17, RFC 8999)
//!
//! Header fields for the packet kinds the engine builds and opens, plus the
//! first-byte layout shared by the serializer and the inbound parser.
//!
//! ```text
//! Long Header:   1 1 T T R R P P   (form, fixed, type, reserved, pn length)
//! Short Header:  0 1 S R R K P P   (form, fixed, spin, reserved, key phase, pn length)
//! ```
//!
//! The reserved bits and the packet number length are covered by header
//! protection; everything else in the first byte is visible on the wire.

#![forbid(unsafe_code)]

use super::number::PacketNumberLength;
use crate::error::{Error, Result};
use crate::types::{ConnectionId, Epoch, PacketNumber};
use crate::version::Version;
use bytes::BufMut;

// ============================================================================
// Header Form Constants (RFC 8999 Section 5.1, RFC 9000 Section 17)
// ============================================================================

/// Header Form Bit (most significant bit)
/// 1 = Long Header, 0 = Short Header
pub const HEADER_FORM_BIT: u8 = 0x80;

/// Fixed Bit (second most significant bit)
/// MUST be set to 1 in all QUIC packets except Version Negotiation
pub const FIXED_BIT: u8 = 0x40;

/// Long Packet Type Mask (bits 4-5)
pub const LONG_PACKET_TYPE_MASK: u8 = 0x30;

/// Reserved bits of a long header (bits 2-3), zero once unprotected
pub const LONG_RESERVED_BITS: u8 = 0x0c;

/// Reserved bits of a short header (bits 3-4), zero once unprotected
pub const SHORT_RESERVED_BITS: u8 = 0x18;

/// Spin Bit (Short Header, bit 5)
pub const SPIN_BIT: u8 = 0x20;

/// Key Phase Bit (Short Header, bit 2)
pub const KEY_PHASE_BIT: u8 = 0x04;

/// First byte of every Version Negotiation packet this engine sends
pub const VERSION_NEGOTIATION_FIRST_BYTE: u8 = HEADER_FORM_BIT | FIXED_BIT;

// ============================================================================
// Packet Type Enumeration
// ============================================================================

/// Packet Type (RFC 9000 Section 17)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Initial packet (Long Header)
    Initial,
    /// 0-RTT packet (Long Header)
    ZeroRtt,
    /// Handshake packet (Long Header)
    Handshake,
    /// Retry packet (Long Header)
    Retry,
    /// 1-RTT packet (Short Header)
    OneRtt,
    /// Version Negotiation packet (special Long Header)
    VersionNegotiation,
}

impl PacketType {
    /// Returns true if this is a long header packet type
    pub fn is_long_header(&self) -> bool {
        !matches!(self, PacketType::OneRtt)
    }

    /// Epoch whose keys protect this packet type.
    ///
    /// `None` for packets without packet protection and for 0-RTT, which
    /// this engine does not accept.
    pub fn epoch(&self) -> Option<Epoch> {
        match self {
            PacketType::Initial => Some(Epoch::Initial),
            PacketType::Handshake => Some(Epoch::Handshake),
            PacketType::OneRtt => Some(Epoch::Application),
            PacketType::ZeroRtt | PacketType::Retry | PacketType::VersionNegotiation => None,
        }
    }
}

/// Header Form (Long vs Short)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderForm {
    /// Long Header (handshake packets)
    Long,
    /// Short Header (1-RTT packets)
    Short,
}

impl HeaderForm {
    /// Header form is visible in the first byte even under header protection.
    pub fn from_first_byte(first_byte: u8) -> Self {
        if first_byte & HEADER_FORM_BIT != 0 {
            HeaderForm::Long
        } else {
            HeaderForm::Short
        }
    }

    /// Bits of the first byte covered by header protection
    /// (RFC 9001 Section 5.4.1).
    pub fn protected_bits(self) -> u8 {
        match self {
            HeaderForm::Long => 0x0f,
            HeaderForm::Short => 0x1f,
        }
    }

    /// Reserved bits that must be zero after header protection is removed.
    pub fn reserved_bits(self) -> u8 {
        match self {
            HeaderForm::Long => LONG_RESERVED_BITS,
            HeaderForm::Short => SHORT_RESERVED_BITS,
        }
    }
}

// ============================================================================
// Header Structures
// ============================================================================

/// Long Header fields shared by Initial and Handshake packets
/// (RFC 9000 Section 17.2).
///
/// The Length field is never stored: it is recomputed from the packet
/// number length and the payload whenever the packet is serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongHeader {
    /// QUIC version
    pub version: Version,

    /// Destination Connection ID
    pub dcid: ConnectionId,

    /// Source Connection ID
    pub scid: ConnectionId,

    /// Full packet number
    pub packet_number: PacketNumber,

    /// Encoded width of the packet number
    pub pn_len: PacketNumberLength,
}

impl LongHeader {
    /// Unprotected first byte for a long header of `packet_type`.
    pub fn first_byte(&self, packet_type: PacketType) -> Result<u8> {
        let type_bits = self.version.long_type_bits(packet_type)?;
        Ok(HEADER_FORM_BIT | FIXED_BIT | (type_bits << 4) | self.pn_len.first_byte_bits())
    }

    /// Bytes up to and including the SCID. Shared by every long header.
    pub(crate) fn write_prefix<B: BufMut>(&self, buf: &mut B, first_byte: u8) {
        write_long_prefix(buf, first_byte, self.version, &self.dcid, &self.scid);
    }

    /// Length of the fixed prefix: first byte, version, both CIDs with their
    /// length bytes.
    pub fn prefix_len(&self) -> usize {
        1 + 4 + 1 + self.dcid.len() + 1 + self.scid.len()
    }
}

/// Short Header (RFC 9000 Section 17.3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortHeader {
    /// Destination Connection ID
    pub dcid: ConnectionId,

    /// Spin bit (for latency measurement)
    pub spin: bool,

    /// Key phase bit (for key updates)
    pub key_phase: bool,

    /// Full packet number
    pub packet_number: PacketNumber,

    /// Encoded width of the packet number
    pub pn_len: PacketNumberLength,
}

impl ShortHeader {
    /// Unprotected first byte.
    pub fn first_byte(&self) -> u8 {
        let mut byte = FIXED_BIT | self.pn_len.first_byte_bits();
        if self.spin {
            byte |= SPIN_BIT;
        }
        if self.key_phase {
            byte |= KEY_PHASE_BIT;
        }
        byte
    }

    /// Offset of the packet number: first byte plus DCID.
    pub fn packet_number_offset(&self) -> usize {
        1 + self.dcid.len()
    }
}

/// Write `first_byte | version | dcid_len | dcid | scid_len | scid`.
pub(crate) fn write_long_prefix<B: BufMut>(
    buf: &mut B,
    first_byte: u8,
    version: Version,
    dcid: &ConnectionId,
    scid: &ConnectionId,
) {
    buf.put_u8(first_byte);
    buf.put_u32(version.as_u32());
    buf.put_u8(dcid.len() as u8);
    buf.put_slice(dcid.as_bytes());
    buf.put_u8(scid.len() as u8);
    buf.put_slice(scid.as_bytes());
}

/// Packet number length encoded in an unprotected first byte.
pub fn packet_number_len(first_byte: u8) -> PacketNumberLength {
    PacketNumberLength::from_first_byte(first_byte)
}

/// Reject a header whose reserved bits are non-zero after header protection
/// removal (RFC 9000 Section 17.2).
pub fn check_reserved_bits(first_byte: u8) -> Result<()> {
    let form = HeaderForm::from_first_byte(first_byte);
    if first_byte & form.reserved_bits() != 0 {
        return Err(Error::ProtocolViolation("reserved header bits set"));
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn long(version: Version, pn_len: PacketNumberLength) -> LongHeader {
        LongHeader {
            version,
            dcid: ConnectionId::from_slice(&[0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08])
                .unwrap(),
            scid: ConnectionId::empty(),
            packet_number: 2,
            pn_len,
        }
    }

    #[test]
    fn test_long_first_byte_v1_initial() {
        // RFC 9001 Appendix A.2: unprotected Initial header starts with 0xc3
        let header = long(Version::V1, PacketNumberLength::FOUR);
        assert_eq!(header.first_byte(PacketType::Initial).unwrap(), 0xc3);
        assert_eq!(header.first_byte(PacketType::Handshake).unwrap(), 0xe3);
    }

    #[test]
    fn test_long_first_byte_v2_initial() {
        let header = long(Version::V2, PacketNumberLength::ONE);
        assert_eq!(header.first_byte(PacketType::Initial).unwrap(), 0xd0);
        assert_eq!(header.first_byte(PacketType::Handshake).unwrap(), 0xf0);
    }

    #[test]
    fn test_short_first_byte() {
        let header = ShortHeader {
            dcid: ConnectionId::empty(),
            spin: false,
            key_phase: false,
            packet_number: 654_360_564,
            pn_len: PacketNumberLength::THREE,
        };
        // RFC 9001 Appendix A.5
        assert_eq!(header.first_byte(), 0x42);

        let flagged = ShortHeader {
            spin: true,
            key_phase: true,
            ..header
        };
        assert_eq!(flagged.first_byte(), 0x66);
    }

    #[test]
    fn test_prefix_layout() {
        let header = long(Version::V1, PacketNumberLength::FOUR);
        let mut buf = Vec::new();
        header.write_prefix(&mut buf, 0xc3);
        assert_eq!(buf.len(), header.prefix_len());
        assert_eq!(
            buf,
            hex::decode("c300000001088394c8f03e51570800").unwrap()
        );
    }

    #[test]
    fn test_header_form_bits() {
        assert_eq!(HeaderForm::from_first_byte(0xc0), HeaderForm::Long);
        assert_eq!(HeaderForm::from_first_byte(0x40), HeaderForm::Short);
        assert_eq!(HeaderForm::Long.protected_bits(), 0x0f);
        assert_eq!(HeaderForm::Short.protected_bits(), 0x1f);
    }

    #[test]
    fn test_reserved_bits() {
        assert!(check_reserved_bits(0xc3).is_ok());
        assert!(check_reserved_bits(0xc7).is_err());
        assert!(check_reserved_bits(0x43).is_ok());
        assert!(check_reserved_bits(0x4b).is_err());
        // Key phase is not reserved
        assert!(check_reserved_bits(0x44).is_ok());
    }

    #[test]
    fn test_packet_type_epochs() {
        assert_eq!(PacketType::Initial.epoch(), Some(Epoch::Initial));
        assert_eq!(PacketType::Handshake.epoch(), Some(Epoch::Handshake));
        assert_eq!(PacketType::OneRtt.epoch(), Some(Epoch::Application));
        assert_eq!(PacketType::Retry.epoch(), None);
        assert!(!PacketType::OneRtt.is_long_header());
    }
}
