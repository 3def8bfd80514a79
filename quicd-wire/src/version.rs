//! # QUIC Versions (RFC 8999, RFC 9000 Section 6, RFC 9369)
//!
//! A [`Version`] carries everything that differs between the versions this
//! engine speaks:
//!
//! - the Initial salt used to derive Initial secrets (RFC 9001 Section 5.2)
//! - the HKDF labels used to expand traffic secrets into packet keys
//! - the mapping between long-header type bits and packet types
//!
//! Version 2 (RFC 9369) is functionally identical to version 1 but rotates
//! all three so middleboxes cannot ossify on version 1 details.
//!
//! The value `0x00000000` is not a version: it marks Version Negotiation
//! packets. Versions of the form `0x?a?a?a?a` are reserved for greasing and
//! are never negotiated.

#![forbid(unsafe_code)]

use crate::error::{Error, Result};
use crate::packet::PacketType;

// ============================================================================
// Version Constants
// ============================================================================

/// QUIC Version 1 (RFC 9000)
pub const VERSION_1: u32 = 0x00000001;

/// Version 2 (RFC 9369)
pub const VERSION_2: u32 = 0x6b3343cf;

/// Version used in Version Negotiation packets (RFC 9000 Section 6)
pub const VERSION_NEGOTIATION: u32 = 0x00000000;

/// Initial salt for version 1 (RFC 9001 Section 5.2)
pub const INITIAL_SALT_V1: [u8; 20] = [
    0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4, 0xc8, 0x0c,
    0xad, 0xcc, 0xbb, 0x7f, 0x0a,
];

/// Initial salt for version 2 (RFC 9369 Section 3.3.1)
pub const INITIAL_SALT_V2: [u8; 20] = [
    0x0d, 0xed, 0xe3, 0xde, 0xf7, 0x00, 0xa6, 0xdb, 0x81, 0x93, 0x81, 0xbe, 0x6e, 0x26, 0x9d,
    0xcb, 0xf9, 0xbd, 0x2e, 0xd9,
];

/// Reserved versions for version negotiation forcing (RFC 9000 Section 6.3)
///
/// These versions have the form 0x?a?a?a?a (where ? is any hex digit).
pub fn is_reserved_version(version: u32) -> bool {
    (version & 0x0f0f0f0f) == 0x0a0a0a0a
}

// ============================================================================
// Packet Key Labels (RFC 9001 Section 5.1, RFC 9369 Section 3.3.2)
// ============================================================================

/// HKDF-Expand-Label labels used to turn a traffic secret into packet keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLabels {
    pub key: &'static [u8],
    pub iv: &'static [u8],
    pub hp: &'static [u8],
}

const LABELS_V1: KeyLabels = KeyLabels {
    key: b"quic key",
    iv: b"quic iv",
    hp: b"quic hp",
};

const LABELS_V2: KeyLabels = KeyLabels {
    key: b"quicv2 key",
    iv: b"quicv2 iv",
    hp: b"quicv2 hp",
};

// ============================================================================
// Version
// ============================================================================

/// A QUIC version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version(u32);

impl Version {
    pub const V1: Version = Version(VERSION_1);
    pub const V2: Version = Version(VERSION_2);
    pub const NEGOTIATION: Version = Version(VERSION_NEGOTIATION);

    pub const fn from_u32(value: u32) -> Self {
        Version(value)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// True for the Version Negotiation sentinel (0x00000000)
    pub fn is_negotiation(self) -> bool {
        self.0 == VERSION_NEGOTIATION
    }

    /// True for greasing versions of the form 0x?a?a?a?a
    pub fn is_reserved(self) -> bool {
        is_reserved_version(self.0)
    }

    /// True when this engine has a key schedule and packet layout for the
    /// version.
    pub fn is_supported(self) -> bool {
        matches!(self.0, VERSION_1 | VERSION_2)
    }

    /// Salt for Initial secret derivation.
    pub fn initial_salt(self) -> Result<&'static [u8; 20]> {
        match self.0 {
            VERSION_1 => Ok(&INITIAL_SALT_V1),
            VERSION_2 => Ok(&INITIAL_SALT_V2),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }

    /// Labels for packet key, IV and header protection key derivation.
    pub fn key_labels(self) -> Result<KeyLabels> {
        match self.0 {
            VERSION_1 => Ok(LABELS_V1),
            VERSION_2 => Ok(LABELS_V2),
            other => Err(Error::UnsupportedVersion(other)),
        }
    }

    /// Two-bit long-header type field (unshifted) for `packet_type`.
    pub fn long_type_bits(self, packet_type: PacketType) -> Result<u8> {
        let bits = match (self.0, packet_type) {
            (VERSION_1, PacketType::Initial) => 0b00,
            (VERSION_1, PacketType::ZeroRtt) => 0b01,
            (VERSION_1, PacketType::Handshake) => 0b10,
            (VERSION_1, PacketType::Retry) => 0b11,
            (VERSION_2, PacketType::Initial) => 0b01,
            (VERSION_2, PacketType::ZeroRtt) => 0b10,
            (VERSION_2, PacketType::Handshake) => 0b11,
            (VERSION_2, PacketType::Retry) => 0b00,
            (VERSION_1 | VERSION_2, _) => {
                return Err(Error::MalformedPacket("packet type has no long-header encoding"))
            }
            (other, _) => return Err(Error::UnsupportedVersion(other)),
        };
        Ok(bits)
    }

    /// Inverse of [`Version::long_type_bits`]. Only the low two bits of
    /// `bits` are used.
    pub fn packet_type_from_bits(self, bits: u8) -> Result<PacketType> {
        let packet_type = match (self.0, bits & 0b11) {
            (VERSION_1, 0b00) | (VERSION_2, 0b01) => PacketType::Initial,
            (VERSION_1, 0b01) | (VERSION_2, 0b10) => PacketType::ZeroRtt,
            (VERSION_1, 0b10) | (VERSION_2, 0b11) => PacketType::Handshake,
            (VERSION_1, _) | (VERSION_2, _) => PacketType::Retry,
            (other, _) => return Err(Error::UnsupportedVersion(other)),
        };
        Ok(packet_type)
    }
}

impl From<u32> for Version {
    fn from(value: u32) -> Self {
        Version(value)
    }
}

impl From<Version> for u32 {
    fn from(version: Version) -> u32 {
        version.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_version() {
        assert!(is_reserved_version(0x0a0a0a0a));
        assert!(is_reserved_version(0x1a1a1a1a));
        assert!(is_reserved_version(0xfafafafa));
        assert!(!is_reserved_version(VERSION_1));
        assert!(!is_reserved_version(VERSION_NEGOTIATION));
        assert!(Version::from_u32(0x5a6a7a8a).is_reserved());
    }

    #[test]
    fn test_negotiation_is_not_a_version() {
        assert!(Version::NEGOTIATION.is_negotiation());
        assert!(!Version::NEGOTIATION.is_supported());
        assert_eq!(
            Version::NEGOTIATION.initial_salt(),
            Err(Error::UnsupportedVersion(0))
        );
    }

    #[test]
    fn test_unknown_version_has_no_key_schedule() {
        let v = Version::from_u32(0xff00001d);
        assert!(!v.is_supported());
        assert!(v.key_labels().is_err());
        assert!(v.long_type_bits(PacketType::Initial).is_err());
    }

    #[test]
    fn test_v2_rotates_type_bits() {
        // RFC 9369 Section 3.2
        assert_eq!(Version::V2.long_type_bits(PacketType::Initial).unwrap(), 0b01);
        assert_eq!(Version::V2.long_type_bits(PacketType::ZeroRtt).unwrap(), 0b10);
        assert_eq!(Version::V2.long_type_bits(PacketType::Handshake).unwrap(), 0b11);
        assert_eq!(Version::V2.long_type_bits(PacketType::Retry).unwrap(), 0b00);
    }

    #[test]
    fn test_type_bits_roundtrip() {
        for version in [Version::V1, Version::V2] {
            for ty in [
                PacketType::Initial,
                PacketType::ZeroRtt,
                PacketType::Handshake,
                PacketType::Retry,
            ] {
                let bits = version.long_type_bits(ty).unwrap();
                assert_eq!(version.packet_type_from_bits(bits).unwrap(), ty);
            }
        }
        assert!(Version::V1.long_type_bits(PacketType::OneRtt).is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(Version::V1.key_labels().unwrap().hp, b"quic hp");
        assert_eq!(Version::V2.key_labels().unwrap().key, b"quicv2 key");
    }
}
