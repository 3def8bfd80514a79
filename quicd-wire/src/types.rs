//! # Core QUIC Types (RFC 8999, RFC 9000)
//!
//! Identifiers shared by the packet, frame, crypto and connection layers.

#![forbid(unsafe_code)]

use bytes::Bytes;
use rand::RngCore;

// ============================================================================
// Connection ID (RFC 9000 Section 5.1, RFC 8999 Section 5.3)
// ============================================================================

/// Maximum length of a Connection ID (20 bytes per RFC 9000)
///
/// RFC 8999 allows up to 255 bytes on the wire for future versions, but
/// every version this engine speaks caps the length at 20.
pub const MAX_CID_LENGTH: usize = 20;

/// Connection ID - Version-independent identifier (RFC 8999 Section 5.3)
///
/// Connection IDs are opaque byte sequences chosen by endpoints.
/// Zero-length CIDs are permitted.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ConnectionId {
    bytes: Bytes,
}

impl ConnectionId {
    /// Create a new ConnectionId from bytes
    ///
    /// Returns None if length exceeds MAX_CID_LENGTH
    pub fn new(bytes: Bytes) -> Option<Self> {
        if bytes.len() > MAX_CID_LENGTH {
            return None;
        }
        Some(Self { bytes })
    }

    /// Create from a borrowed slice (copies data)
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        Self::new(Bytes::copy_from_slice(slice))
    }

    /// Generate a random connection ID of `len` bytes (clamped to
    /// MAX_CID_LENGTH).
    pub fn random(len: usize) -> Self {
        let mut buf = vec![0u8; len.min(MAX_CID_LENGTH)];
        rand::thread_rng().fill_bytes(&mut buf);
        Self {
            bytes: Bytes::from(buf),
        }
    }

    /// Access the underlying bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the connection ID
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if this is a zero-length connection ID
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Create an empty (zero-length) connection ID
    pub fn empty() -> Self {
        Self {
            bytes: Bytes::new(),
        }
    }
}

impl std::fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectionId({})", self)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.bytes[..] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

// ============================================================================
// Packet Number (RFC 9000 Section 12.3)
// ============================================================================

/// Packet Number - Monotonically increasing per packet number space
pub type PacketNumber = u64;

/// Maximum packet number value (2^62 - 1)
pub const MAX_PACKET_NUMBER: u64 = (1u64 << 62) - 1;

/// Stateless reset token carried in NEW_CONNECTION_ID frames
pub type StatelessResetToken = [u8; 16];

// ============================================================================
// Epoch (RFC 9000 Section 12.3, RFC 9001 Section 4)
// ============================================================================

/// Cryptographic epoch / packet number space.
///
/// Each epoch has its own keys and its own packet number sequence.
/// 0-RTT shares the Application space but is not supported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Epoch {
    /// Initial packets, keys derived from the client's first DCID
    Initial = 0,
    /// Handshake packets
    Handshake = 1,
    /// 1-RTT packets
    Application = 2,
}

impl Epoch {
    /// All epochs in progression order
    pub const ALL: [Epoch; 3] = [Epoch::Initial, Epoch::Handshake, Epoch::Application];

    /// Index for per-epoch arrays
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Epoch::Initial => "initial",
            Epoch::Handshake => "handshake",
            Epoch::Application => "application",
        }
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Side (Client vs Server)
// ============================================================================

/// Connection endpoint side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Client endpoint
    Client,
    /// Server endpoint
    Server,
}

impl Side {
    /// Check if this side is the client
    pub fn is_client(self) -> bool {
        matches!(self, Side::Client)
    }

    /// Check if this side is the server
    pub fn is_server(self) -> bool {
        matches!(self, Side::Server)
    }

    /// Get the opposite side
    pub fn opposite(self) -> Side {
        match self {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Client => f.write_str("client"),
            Side::Server => f.write_str("server"),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_length_bound() {
        assert!(ConnectionId::from_slice(&[0u8; 20]).is_some());
        assert!(ConnectionId::from_slice(&[0u8; 21]).is_none());
        assert!(ConnectionId::from_slice(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_connection_id_display() {
        let cid = ConnectionId::from_slice(&[0x83, 0x94, 0xc8]).unwrap();
        assert_eq!(cid.to_string(), "8394c8");
        assert_eq!(format!("{:?}", cid), "ConnectionId(8394c8)");
    }

    #[test]
    fn test_random_connection_id() {
        assert_eq!(ConnectionId::random(8).len(), 8);
        assert_eq!(ConnectionId::random(64).len(), MAX_CID_LENGTH);
    }

    #[test]
    fn test_epoch_order() {
        assert!(Epoch::Initial < Epoch::Handshake);
        assert!(Epoch::Handshake < Epoch::Application);
        assert_eq!(Epoch::ALL.map(Epoch::index), [0, 1, 2]);
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Client.opposite(), Side::Server);
        assert!(Side::Server.opposite().is_client());
    }
}
