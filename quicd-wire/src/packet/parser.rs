//! # Inbound Packet Parsing (RFC 9000 Section 12.2, 17)
//!
//! A UDP datagram may carry several coalesced QUIC packets. Long headers
//! delimit themselves through their Length field; a short header packet
//! always extends to the end of the datagram.
//!
//! Parsing happens in two steps:
//!
//! 1. [`parse_datagram`] reads the fields that are visible before header
//!    protection is removed and locates each packet's packet number offset.
//!    No keys are needed.
//! 2. [`open_packet`] removes protection with the epoch's
//!    [`PacketProtector`], decodes the frames and rebuilds a [`Packet`].
//!
//! All slices share the datagram's buffer.

#![forbid(unsafe_code)]

use super::header::{
    check_reserved_bits, LongHeader, PacketType, ShortHeader, FIXED_BIT, HEADER_FORM_BIT,
    KEY_PHASE_BIT, LONG_PACKET_TYPE_MASK, SPIN_BIT,
};
use super::types::{HandshakePacket, InitialPacket, Packet, ShortPacket, VersionNegotiationPacket};
use crate::config::EngineConfig;
use crate::crypto::protector::PacketProtector;
use crate::error::{Error, Result};
use crate::frames::{DefaultFrameParser, FrameParser};
use crate::types::{ConnectionId, PacketNumber, MAX_CID_LENGTH};
use crate::varint::read_varint;
use crate::version::Version;
use bytes::Bytes;
use tracing::{debug, trace, warn};

/// A packet whose header protection is still in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedPacket {
    pub packet_type: PacketType,
    /// Version of a long header packet; `None` for 1-RTT
    pub version: Option<Version>,
    pub dcid: ConnectionId,
    /// Source Connection ID of a long header packet
    pub scid: Option<ConnectionId>,
    /// Initial token, empty for other packet types
    pub token: Bytes,
    /// Offset of the packet number within `bytes`
    pub pn_offset: usize,
    /// The whole packet, header through tag
    pub bytes: Bytes,
}

impl ProtectedPacket {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One packet found in a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPacket {
    Protected(ProtectedPacket),
    VersionNegotiation(VersionNegotiationPacket),
}

struct Reader<'a> {
    buf: &'a Bytes,
    pos: usize,
    max_cid_len: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or(Error::MalformedPacket("truncated header"))?;
        self.pos += 1;
        Ok(b)
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + 4)
            .ok_or(Error::MalformedPacket("truncated version"))?;
        self.pos += 4;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn varint(&mut self) -> Result<u64> {
        read_varint(self.buf, &mut self.pos).ok_or(Error::MalformedPacket("truncated varint"))
    }

    fn slice(&mut self, len: usize) -> Result<Bytes> {
        if self.pos + len > self.buf.len() {
            return Err(Error::MalformedPacket("field exceeds datagram"));
        }
        let out = self.buf.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(out)
    }

    fn cid(&mut self) -> Result<ConnectionId> {
        let len = self.u8()? as usize;
        if len > self.max_cid_len {
            return Err(Error::InvalidConnectionIdLength(len));
        }
        let bytes = self.slice(len)?;
        ConnectionId::new(bytes).ok_or(Error::InvalidConnectionIdLength(len))
    }
}

/// Split a datagram into its packets.
///
/// Short header DCIDs are read with `config.short_header_dcid_length`, the
/// length of the connection IDs this endpoint issues. Long header CIDs
/// longer than `config.max_connection_id_length` are rejected.
pub fn parse_datagram(datagram: &Bytes, config: &EngineConfig) -> Result<Vec<InboundPacket>> {
    let mut packets = Vec::new();
    let mut offset = 0;

    while offset < datagram.len() {
        let rest = datagram.slice(offset..);
        let (packet, consumed) = parse_packet(&rest, config)?;
        offset += consumed;
        if let Some(packet) = packet {
            packets.push(packet);
        }
    }

    trace!(count = packets.len(), len = datagram.len(), "parsed datagram");
    Ok(packets)
}

/// Parse the packet at the start of `buf`, returning it with the number of
/// bytes it spans. Packets this engine does not process (0-RTT) are skipped
/// and yield `None`.
fn parse_packet(buf: &Bytes, config: &EngineConfig) -> Result<(Option<InboundPacket>, usize)> {
    let mut r = Reader {
        buf,
        pos: 0,
        max_cid_len: config.max_connection_id_length.min(MAX_CID_LENGTH),
    };
    let first = r.u8()?;

    if first & HEADER_FORM_BIT == 0 {
        if first & FIXED_BIT == 0 {
            return Err(Error::MalformedPacket("fixed bit not set"));
        }
        let dcid_len = config.short_header_dcid_length;
        let dcid = r.slice(dcid_len)?;
        let dcid = ConnectionId::new(dcid).ok_or(Error::InvalidConnectionIdLength(dcid_len))?;
        let packet = ProtectedPacket {
            packet_type: PacketType::OneRtt,
            version: None,
            dcid,
            scid: None,
            token: Bytes::new(),
            pn_offset: r.pos,
            bytes: buf.clone(),
        };
        return Ok((Some(InboundPacket::Protected(packet)), buf.len()));
    }

    let version = Version::from_u32(r.u32()?);
    let dcid = r.cid()?;
    let scid = r.cid()?;

    if version.is_negotiation() {
        let list = r.slice(buf.len() - r.pos)?;
        if list.len() % 4 != 0 {
            return Err(Error::MalformedPacket("version list not a multiple of 4"));
        }
        let versions = list
            .chunks_exact(4)
            .map(|c| Version::from_u32(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
            .collect();
        let vn = VersionNegotiationPacket {
            dcid,
            scid,
            versions,
        };
        return Ok((Some(InboundPacket::VersionNegotiation(vn)), buf.len()));
    }

    if first & FIXED_BIT == 0 {
        return Err(Error::MalformedPacket("fixed bit not set"));
    }
    if !version.is_supported() {
        return Err(Error::UnsupportedVersion(version.as_u32()));
    }

    let packet_type = version.packet_type_from_bits((first & LONG_PACKET_TYPE_MASK) >> 4)?;
    let token = match packet_type {
        PacketType::Initial => {
            let len = r.varint()? as usize;
            r.slice(len)?
        }
        PacketType::Retry => return Err(Error::MalformedPacket("retry packets are not supported")),
        _ => Bytes::new(),
    };

    let length = r.varint()? as usize;
    let pn_offset = r.pos;
    let end = pn_offset
        .checked_add(length)
        .filter(|&end| end <= buf.len())
        .ok_or(Error::MalformedPacket("length exceeds datagram"))?;

    if packet_type == PacketType::ZeroRtt {
        debug!(len = end, "skipping 0-RTT packet");
        return Ok((None, end));
    }

    let packet = ProtectedPacket {
        packet_type,
        version: Some(version),
        dcid,
        scid: Some(scid),
        token,
        pn_offset,
        bytes: buf.slice(..end),
    };
    Ok((Some(InboundPacket::Protected(packet)), end))
}

/// Remove protection from `packet` and decode its frames.
///
/// `largest_pn` is the largest packet number processed so far in the
/// packet's number space. A packet that fails to open is logged and the
/// error returned; the caller drops it without closing the connection.
pub fn open_packet(
    packet: &ProtectedPacket,
    protector: &PacketProtector,
    largest_pn: Option<PacketNumber>,
) -> Result<Packet> {
    if packet.packet_type.epoch() != Some(protector.epoch()) {
        return Err(Error::ContractViolation("protector epoch does not match packet"));
    }

    let opened = match protector.open(&packet.bytes, packet.pn_offset, largest_pn) {
        Ok(opened) => opened,
        Err(e) => {
            warn!(
                packet_type = ?packet.packet_type,
                dcid = %packet.dcid,
                error = %e,
                "dropping packet that failed to open"
            );
            return Err(e);
        }
    };

    let first = opened.header[0];
    check_reserved_bits(first)?;

    let frames = DefaultFrameParser.parse_all(&Bytes::from(opened.payload))?;
    if frames.is_empty() {
        return Err(Error::ProtocolViolation("packet carries no frames"));
    }

    trace!(
        packet_type = ?packet.packet_type,
        packet_number = opened.packet_number,
        frames = frames.len(),
        "opened packet"
    );

    let long_header = |version: Version| LongHeader {
        version,
        dcid: packet.dcid.clone(),
        scid: packet.scid.clone().unwrap_or_default(),
        packet_number: opened.packet_number,
        pn_len: opened.pn_len,
    };

    let packet = match (packet.packet_type, packet.version) {
        (PacketType::Initial, Some(version)) => Packet::Initial(InitialPacket {
            header: long_header(version),
            token: packet.token.clone(),
            frames,
        }),
        (PacketType::Handshake, Some(version)) => Packet::Handshake(HandshakePacket {
            header: long_header(version),
            frames,
        }),
        (PacketType::OneRtt, None) => Packet::Short(ShortPacket {
            header: ShortHeader {
                dcid: packet.dcid.clone(),
                spin: first & SPIN_BIT != 0,
                key_phase: first & KEY_PHASE_BIT != 0,
                packet_number: opened.packet_number,
                pn_len: opened.pn_len,
            },
            frames,
        }),
        _ => return Err(Error::MalformedPacket("packet type cannot be opened")),
    };
    Ok(packet)
}
