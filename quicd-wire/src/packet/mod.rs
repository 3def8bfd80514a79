//! # Packet Layer (RFC 9000 Section 17)
//!
//! - [`header`]: long and short header layouts and first-byte bits
//! - [`number`]: packet number truncation and recovery
//! - [`types`]: the packet model and sealing
//! - [`parser`]: datagram splitting and packet opening

pub mod header;
pub mod number;
pub mod parser;
pub mod types;

pub use header::{check_reserved_bits, HeaderForm, LongHeader, PacketType, ShortHeader};
pub use number::PacketNumberLength;
pub use parser::{open_packet, parse_datagram, InboundPacket, ProtectedPacket};
pub use types::{
    HandshakePacket, InitialPacket, Packet, SealedPacket, ShortPacket, VersionNegotiationPacket,
};
