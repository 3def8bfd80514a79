//! # Packet Model (RFC 9000 Section 17)
//!
//! A [`Packet`] is a closed set of the packet kinds this engine builds and
//! opens. Each variant carries exactly the fields valid for its kind; the
//! Length field of long headers is never stored, it is derived from the
//! packet number length and payload size whenever bytes are produced.
//!
//! ```text
//! Initial:    prefix | token len (i) | token | length (i) | pn (8..32)
//! Handshake:  prefix | length (i) | pn (8..32)
//! 1-RTT:      first byte | dcid | pn (8..32)
//! prefix:     first byte | version (32) | dcid len (8) | dcid | scid len (8) | scid
//! ```

#![forbid(unsafe_code)]

use super::header::{
    write_long_prefix, LongHeader, PacketType, ShortHeader, VERSION_NEGOTIATION_FIRST_BYTE,
};
use super::number;
use crate::config::EngineConfig;
use crate::crypto::backend::TAG_LEN;
use crate::crypto::protector::{Sealer, SAMPLE_OFFSET};
use crate::error::{Error, Result};
use crate::frames::Frame;
use crate::types::{ConnectionId, Epoch, PacketNumber};
use crate::varint::{put_varint, varint_len};
use crate::version::Version;
use bytes::{BufMut, Bytes, BytesMut};

/// Initial packet (RFC 9000 Section 17.2.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialPacket {
    pub header: LongHeader,
    /// Address validation token, empty when none
    pub token: Bytes,
    pub frames: Vec<Frame>,
}

/// Handshake packet (RFC 9000 Section 17.2.4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePacket {
    pub header: LongHeader,
    pub frames: Vec<Frame>,
}

/// 1-RTT packet (RFC 9000 Section 17.3.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortPacket {
    pub header: ShortHeader,
    pub frames: Vec<Frame>,
}

/// Version Negotiation packet (RFC 9000 Section 17.2.1)
///
/// Not protected. The first byte is always `0xc0` and the version field
/// always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionNegotiationPacket {
    pub dcid: ConnectionId,
    pub scid: ConnectionId,
    pub versions: Vec<Version>,
}

impl VersionNegotiationPacket {
    /// Reply to a client whose Initial carried `dcid`/`scid`, listing the
    /// configured versions. The reply swaps the connection IDs.
    pub fn from_config(dcid: ConnectionId, scid: ConnectionId, config: &EngineConfig) -> Self {
        Self {
            dcid,
            scid,
            versions: config
                .supported_versions
                .iter()
                .copied()
                .map(Version::from_u32)
                .collect(),
        }
    }

    /// Serialized length in bytes.
    pub fn encoded_len(&self) -> usize {
        1 + 4 + 1 + self.dcid.len() + 1 + self.scid.len() + self.versions.len() * 4
    }

    /// Header bytes: everything up to and including the SCID.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(7 + self.dcid.len() + self.scid.len());
        write_long_prefix(
            &mut buf,
            VERSION_NEGOTIATION_FIRST_BYTE,
            Version::NEGOTIATION,
            &self.dcid,
            &self.scid,
        );
        buf
    }

    /// Supported version list, 4 bytes per version.
    pub fn payload_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.versions.len() * 4);
        for version in &self.versions {
            buf.put_u32(version.as_u32());
        }
        buf
    }

    /// Append the packet to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_slice(&self.header_bytes());
        buf.put_slice(&self.payload_bytes());
    }

    /// First mutually supported version, in the order we prefer.
    pub fn select_version(&self, preferred: &[u32]) -> Option<Version> {
        preferred
            .iter()
            .map(|&v| Version::from_u32(v))
            .find(|v| v.is_supported() && self.versions.contains(v))
    }
}

/// A QUIC packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Initial(InitialPacket),
    Handshake(HandshakePacket),
    Short(ShortPacket),
    VersionNegotiation(VersionNegotiationPacket),
}

/// Protected packet ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPacket {
    /// Header with protection applied
    pub header: Vec<u8>,
    /// AEAD ciphertext followed by the tag
    pub payload: Vec<u8>,
}

impl SealedPacket {
    pub fn len(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate header and payload.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        buf.put_slice(&self.header);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Initial(_) => PacketType::Initial,
            Packet::Handshake(_) => PacketType::Handshake,
            Packet::Short(_) => PacketType::OneRtt,
            Packet::VersionNegotiation(_) => PacketType::VersionNegotiation,
        }
    }

    /// Epoch whose keys protect the packet, `None` for Version Negotiation.
    pub fn epoch(&self) -> Option<Epoch> {
        self.packet_type().epoch()
    }

    pub fn is_long_header(&self) -> bool {
        !matches!(self, Packet::Short(_))
    }

    pub fn dcid(&self) -> &ConnectionId {
        match self {
            Packet::Initial(p) => &p.header.dcid,
            Packet::Handshake(p) => &p.header.dcid,
            Packet::Short(p) => &p.header.dcid,
            Packet::VersionNegotiation(p) => &p.dcid,
        }
    }

    pub fn scid(&self) -> Option<&ConnectionId> {
        match self {
            Packet::Initial(p) => Some(&p.header.scid),
            Packet::Handshake(p) => Some(&p.header.scid),
            Packet::Short(_) => None,
            Packet::VersionNegotiation(p) => Some(&p.scid),
        }
    }

    pub fn packet_number(&self) -> Option<PacketNumber> {
        match self {
            Packet::Initial(p) => Some(p.header.packet_number),
            Packet::Handshake(p) => Some(p.header.packet_number),
            Packet::Short(p) => Some(p.header.packet_number),
            Packet::VersionNegotiation(_) => None,
        }
    }

    /// Frames carried by the packet; empty for Version Negotiation.
    pub fn frames(&self) -> &[Frame] {
        match self {
            Packet::Initial(p) => &p.frames,
            Packet::Handshake(p) => &p.frames,
            Packet::Short(p) => &p.frames,
            Packet::VersionNegotiation(_) => &[],
        }
    }

    /// Packet number width, `None` for Version Negotiation.
    fn pn_len(&self) -> Option<number::PacketNumberLength> {
        match self {
            Packet::Initial(p) => Some(p.header.pn_len),
            Packet::Handshake(p) => Some(p.header.pn_len),
            Packet::Short(p) => Some(p.header.pn_len),
            Packet::VersionNegotiation(_) => None,
        }
    }

    /// Value of the long-header Length field for a plaintext payload of
    /// `payload_len` bytes: packet number, ciphertext and tag.
    pub fn length_field(&self, payload_len: usize) -> usize {
        self.pn_len().map_or(0, |l| l.len()) + payload_len + TAG_LEN
    }

    /// Offset of the packet number within the serialized header.
    ///
    /// Long headers depend on the payload size through the VarInt-encoded
    /// Length field.
    pub fn packet_number_offset(&self, payload_len: usize) -> Result<usize> {
        let length = self.length_field(payload_len) as u64;
        match self {
            Packet::Initial(p) => Ok(p.header.prefix_len()
                + varint_len(p.token.len() as u64)
                + p.token.len()
                + varint_len(length)),
            Packet::Handshake(p) => Ok(p.header.prefix_len() + varint_len(length)),
            Packet::Short(p) => Ok(p.header.packet_number_offset()),
            Packet::VersionNegotiation(_) => Err(Error::ContractViolation(
                "version negotiation packets carry no packet number",
            )),
        }
    }

    /// Unprotected header for a plaintext payload of `payload_len` bytes.
    pub fn header_bytes(&self, payload_len: usize) -> Result<Vec<u8>> {
        let length = self.length_field(payload_len) as u64;
        let mut buf = Vec::with_capacity(self.packet_number_offset(payload_len).unwrap_or(0) + 4);

        match self {
            Packet::Initial(p) => {
                p.header
                    .write_prefix(&mut buf, p.header.first_byte(PacketType::Initial)?);
                put_varint(&mut buf, p.token.len() as u64)?;
                buf.put_slice(&p.token);
                put_varint(&mut buf, length)?;
                number::write_truncated(&mut buf, p.header.packet_number, p.header.pn_len);
            }
            Packet::Handshake(p) => {
                p.header
                    .write_prefix(&mut buf, p.header.first_byte(PacketType::Handshake)?);
                put_varint(&mut buf, length)?;
                number::write_truncated(&mut buf, p.header.packet_number, p.header.pn_len);
            }
            Packet::Short(p) => {
                buf.put_u8(p.header.first_byte());
                buf.put_slice(p.header.dcid.as_bytes());
                number::write_truncated(&mut buf, p.header.packet_number, p.header.pn_len);
            }
            Packet::VersionNegotiation(p) => return Ok(p.header_bytes()),
        }
        Ok(buf)
    }

    /// Plaintext payload: encoded frames, padded so that the header
    /// protection sample is always available (RFC 9001 Section 5.4.2).
    ///
    /// Frames not allowed in the packet's epoch are rejected.
    pub fn payload_bytes(&self) -> Result<BytesMut> {
        let (epoch, pn_len) = match (self.epoch(), self.pn_len()) {
            (Some(epoch), Some(pn_len)) => (epoch, pn_len),
            _ => {
                if let Packet::VersionNegotiation(p) = self {
                    return Ok(BytesMut::from(&p.payload_bytes()[..]));
                }
                return Err(Error::ContractViolation("packet kind carries no frames"));
            }
        };

        let mut buf = BytesMut::with_capacity(self.frames().iter().map(Frame::encoded_len).sum());
        for frame in self.frames() {
            if !frame.is_allowed_in(epoch) {
                return Err(Error::ProtocolViolation("frame not allowed in packet epoch"));
            }
            frame.encode(&mut buf)?;
        }

        let min_len = SAMPLE_OFFSET.saturating_sub(pn_len.len()).max(1);
        if buf.len() < min_len {
            Frame::Padding(min_len - buf.len()).encode(&mut buf)?;
        }
        Ok(buf)
    }

    /// Encrypt the payload and apply header protection.
    pub fn seal(&self, sealer: &Sealer) -> Result<SealedPacket> {
        if let Packet::VersionNegotiation(_) = self {
            return Err(Error::ContractViolation(
                "version negotiation packets are not protected",
            ));
        }

        let plaintext = self.payload_bytes()?;
        let mut header = self.header_bytes(plaintext.len())?;
        let pn_offset = self.packet_number_offset(plaintext.len())?;
        let packet_number = self.packet_number().unwrap_or(0);

        let payload = sealer.seal_packet(&mut header, pn_offset, packet_number, &plaintext)?;
        Ok(SealedPacket { header, payload })
    }
}
