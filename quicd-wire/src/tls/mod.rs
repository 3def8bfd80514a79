//! # TLS Engine Boundary (RFC 9001 Section 4)
//!
//! The handshake machine never interprets TLS semantics. It asks a
//! [`TlsMessageParser`] whether the bytes accumulated so far begin with a
//! complete message of the kind it expects next, and acts on the answer.
//!
//! [`HandshakeFramer`] is the default parser: it delimits messages by their
//! 4-byte handshake header (RFC 8446 Section 4) and checks the type byte.

#![forbid(unsafe_code)]

use crate::types::Side;
use bytes::{BufMut, Bytes, BytesMut};

/// Handshake header: 1-byte type, 3-byte length
pub const HANDSHAKE_HEADER_LEN: usize = 4;

/// Largest body a 24-bit length can describe
pub const MAX_MESSAGE_BODY: usize = (1 << 24) - 1;

/// TLS 1.3 handshake messages that appear on the QUIC CRYPTO streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandshakeMessageKind {
    ClientHello = 1,
    ServerHello = 2,
    EncryptedExtensions = 8,
    Certificate = 11,
    CertificateVerify = 15,
    Finished = 20,
}

impl HandshakeMessageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ClientHello),
            2 => Some(Self::ServerHello),
            8 => Some(Self::EncryptedExtensions),
            11 => Some(Self::Certificate),
            15 => Some(Self::CertificateVerify),
            20 => Some(Self::Finished),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ClientHello => "ClientHello",
            Self::ServerHello => "ServerHello",
            Self::EncryptedExtensions => "EncryptedExtensions",
            Self::Certificate => "Certificate",
            Self::CertificateVerify => "CertificateVerify",
            Self::Finished => "Finished",
        }
    }

    /// The endpoint that writes this message. Finished is sent by both, so
    /// it has no fixed author.
    pub fn author(self) -> Option<Side> {
        match self {
            Self::ClientHello => Some(Side::Client),
            Self::Finished => None,
            _ => Some(Side::Server),
        }
    }
}

impl std::fmt::Display for HandshakeMessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of asking the TLS engine for the next message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsParse {
    /// A complete message, header included. Its length is how many bytes
    /// the caller consumes.
    Message(Bytes),
    /// The buffer holds a prefix of a valid message
    NeedMoreData,
    /// The buffer cannot start with the expected message
    Invalid,
}

/// Message-boundary detection for the handshake machine.
pub trait TlsMessageParser: Send {
    fn parse(&mut self, expected: HandshakeMessageKind, buf: &[u8]) -> TlsParse;
}

/// Delimits TLS handshake messages by their type and 24-bit length.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandshakeFramer;

impl HandshakeFramer {
    pub fn new() -> Self {
        Self
    }

    /// Frame `body` as a handshake message of `kind`.
    pub fn encode(kind: HandshakeMessageKind, body: &[u8]) -> Bytes {
        debug_assert!(body.len() <= MAX_MESSAGE_BODY);
        let mut buf = BytesMut::with_capacity(HANDSHAKE_HEADER_LEN + body.len());
        buf.put_u8(kind.as_u8());
        buf.put_uint(body.len() as u64, 3);
        buf.put_slice(body);
        buf.freeze()
    }
}

impl TlsMessageParser for HandshakeFramer {
    fn parse(&mut self, expected: HandshakeMessageKind, buf: &[u8]) -> TlsParse {
        let Some(&kind) = buf.first() else {
            return TlsParse::NeedMoreData;
        };
        if kind != expected.as_u8() {
            return TlsParse::Invalid;
        }
        if buf.len() < HANDSHAKE_HEADER_LEN {
            return TlsParse::NeedMoreData;
        }

        let body_len = u32::from_be_bytes([0, buf[1], buf[2], buf[3]]) as usize;
        let total = HANDSHAKE_HEADER_LEN + body_len;
        if buf.len() < total {
            return TlsParse::NeedMoreData;
        }
        TlsParse::Message(Bytes::copy_from_slice(&buf[..total]))
    }
}
