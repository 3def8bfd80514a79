//! quicd-wire: QUIC wire protocol engine
//!
//! Codecs, packet protection and the handshake-driving connection state
//! machine of a QUIC transport, as specified in RFC 9000 and RFC 9001
//! (with RFC 9369 for QUIC version 2).
//!
//! # Architecture
//!
//! - **Pure state machines**: no I/O, no timers, no internal threads. Every
//!   operation returns [`connection::Directive`]s for the driver.
//! - **Zero-copy parsing**: payloads are `bytes::Bytes` slices of the
//!   received datagram.
//! - **Pluggable crypto**: AEAD and header protection sit behind the
//!   [`crypto::backend`] traits, implemented with RustCrypto.
//! - **Explicit configuration**: supported versions and limits come from an
//!   [`EngineConfig`] passed in at construction.
//!
//! # Data Flow
//!
//! ```text
//! datagram -> packet::parse_datagram -> packet::open_packet (PacketProtector)
//!          -> Packet -> ConnectionStateMachine -> Directive*
//! Directive::EmitPackets -> Packet::seal (Sealer) -> datagram
//! ```
//!
//! # Module Organization
//!
//! - `varint`: RFC 9000 variable-length integers
//! - `types`: connection IDs, epochs, endpoint roles
//! - `version`: version numbers, salts and labels
//! - `frames`: frame model, encoding and parsing
//! - `packet`: headers, packet numbers, sealing and inbound parsing
//! - `crypto`: key derivation, AEAD and header protection
//! - `tls`: TLS message boundary detection
//! - `connection`: handshake and connection state machines
//! - `config`: engine configuration

#![forbid(unsafe_code)]

pub mod config;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod frames;
pub mod packet;
pub mod tls;
pub mod types;
pub mod varint;
pub mod version;

// Re-export key types
pub use config::EngineConfig;
pub use connection::{
    ConnectionStateMachine, Directive, HandshakeState, HandshakeStateMachine, OutboundPacket,
    State,
};
pub use crypto::{CipherSuite, Opener, PacketProtector, Sealer};
pub use error::{CryptoError, Error, Result, TransportError};
pub use frames::{DefaultFrameParser, Frame, FrameParser};
pub use packet::{open_packet, parse_datagram, Packet, PacketType, ProtectedPacket};
pub use tls::{HandshakeFramer, HandshakeMessageKind, TlsMessageParser, TlsParse};
pub use types::{ConnectionId, Epoch, Side};
pub use varint::VarInt;
pub use version::Version;
