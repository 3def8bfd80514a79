//! QUIC Error Types
//!
//! RFC 9000 Section 20 defines the transport error space carried in
//! CONNECTION_CLOSE frames of type 0x1c. Every [`Error`] produced by this
//! crate maps onto one of those codes through [`Error::transport_error`] so a
//! driver can close the connection with the right wire code.
//!
//! Errors fall into three families:
//! - **Protocol errors**: bad handshake ordering, malformed frames, unknown
//!   versions. Recoverable at the connection level.
//! - **Crypto errors**: AEAD failures, missing keys, derivation failures.
//! - **Contract violations**: the caller used the engine incorrectly
//!   (operations on an idle or terminated connection, re-installing keys).
//!   These are bugs in the driver, see [`Error::is_fatal`].
//!
//! Running out of input is never an error here. Decoders report it with
//! `Option` or [`crate::tls::TlsParse::NeedMoreData`].

#![forbid(unsafe_code)]

use thiserror::Error;

/// Generic Result Type for QUIC Operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport Error Codes as defined in RFC 9000 Section 20.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportError {
    /// No error (0x00) - Used for graceful shutdown
    NoError,

    /// Internal Error (0x01) - Implementation error
    InternalError,

    /// Connection Refused (0x02) - Server refuses connection
    ConnectionRefused,

    /// Flow Control Error (0x03) - Peer exceeded flow control limits
    FlowControlError,

    /// Stream Limit Error (0x04) - Stream limit exceeded
    StreamLimitError,

    /// Stream State Error (0x05) - Frame received in invalid stream state
    StreamStateError,

    /// Final Size Error (0x06) - Final size violation
    FinalSizeError,

    /// Frame Encoding Error (0x07) - Frame encoding error
    FrameEncodingError,

    /// Transport Parameter Error (0x08) - Invalid transport parameters
    TransportParameterError,

    /// Connection ID Limit Error (0x09) - Connection ID limit exceeded
    ConnectionIdLimitError,

    /// Protocol Violation (0x0a) - Generic protocol violation
    ProtocolViolation,

    /// Invalid Token (0x0b)
    InvalidToken,

    /// Application Error (0x0c)
    ApplicationError,

    /// Crypto Buffer Exceeded (0x0d) - CRYPTO data buffer overflowed
    CryptoBufferExceeded,

    /// Key Update Error (0x0e)
    KeyUpdateError,

    /// AEAD Limit Reached (0x0f)
    AeadLimitReached,

    /// No Viable Path (0x10)
    NoViablePath,

    /// TLS alert mapped into the CRYPTO_ERROR range (0x0100 + alert)
    Crypto(u8),
}

impl TransportError {
    /// Wire value of this error code.
    pub fn code(self) -> u64 {
        match self {
            TransportError::NoError => 0x00,
            TransportError::InternalError => 0x01,
            TransportError::ConnectionRefused => 0x02,
            TransportError::FlowControlError => 0x03,
            TransportError::StreamLimitError => 0x04,
            TransportError::StreamStateError => 0x05,
            TransportError::FinalSizeError => 0x06,
            TransportError::FrameEncodingError => 0x07,
            TransportError::TransportParameterError => 0x08,
            TransportError::ConnectionIdLimitError => 0x09,
            TransportError::ProtocolViolation => 0x0a,
            TransportError::InvalidToken => 0x0b,
            TransportError::ApplicationError => 0x0c,
            TransportError::CryptoBufferExceeded => 0x0d,
            TransportError::KeyUpdateError => 0x0e,
            TransportError::AeadLimitReached => 0x0f,
            TransportError::NoViablePath => 0x10,
            TransportError::Crypto(alert) => 0x0100 + alert as u64,
        }
    }

    /// Parse a wire value. Unknown codes yield `None`.
    pub fn from_code(code: u64) -> Option<Self> {
        let err = match code {
            0x00 => TransportError::NoError,
            0x01 => TransportError::InternalError,
            0x02 => TransportError::ConnectionRefused,
            0x03 => TransportError::FlowControlError,
            0x04 => TransportError::StreamLimitError,
            0x05 => TransportError::StreamStateError,
            0x06 => TransportError::FinalSizeError,
            0x07 => TransportError::FrameEncodingError,
            0x08 => TransportError::TransportParameterError,
            0x09 => TransportError::ConnectionIdLimitError,
            0x0a => TransportError::ProtocolViolation,
            0x0b => TransportError::InvalidToken,
            0x0c => TransportError::ApplicationError,
            0x0d => TransportError::CryptoBufferExceeded,
            0x0e => TransportError::KeyUpdateError,
            0x0f => TransportError::AeadLimitReached,
            0x10 => TransportError::NoViablePath,
            0x0100..=0x01ff => TransportError::Crypto((code - 0x0100) as u8),
            _ => return None,
        };
        Some(err)
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} (0x{:x})", self, self.code())
    }
}

/// Packet protection failures (RFC 9001 Section 5)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD tag did not verify
    #[error("packet authentication failed")]
    AuthenticationFailed,

    /// Not enough ciphertext to take a 16-byte header protection sample
    #[error("header protection sample unavailable: need {needed} bytes, have {available}")]
    SampleTooShort { needed: usize, available: usize },

    /// No opener/sealer installed for the requested operation
    #[error("no {0} keys installed")]
    MissingKeys(&'static str),

    /// A sealer or opener is already present in the slot
    #[error("{0} keys already installed")]
    KeyAlreadyInstalled(&'static str),

    /// Key material has the wrong size for the cipher
    #[error("invalid key length for {0}")]
    InvalidKeyLength(&'static str),

    /// HKDF could not produce the requested output
    #[error("key derivation failed: {0}")]
    KeyDerivation(&'static str),

    /// TLS cipher suite identifier this engine does not implement
    #[error("unsupported cipher suite 0x{0:04x}")]
    UnsupportedCipherSuite(u16),
}

/// Unified Error Type for the QUIC wire engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Explicit transport-level error
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// Packet protection error
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A state machine was asked to move somewhere it cannot go
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: &'static str, to: &'static str },

    /// Bytes remained after the last TLS message the current state can accept
    #[error("{0} unexpected bytes left after TLS message")]
    UnexpectedTrailingBytes(usize),

    /// Version without key schedule or packet layout support
    #[error("unsupported version 0x{0:08x}")]
    UnsupportedVersion(u32),

    /// Value does not fit in a 62-bit variable-length integer
    #[error("value {0} out of range for a variable-length integer")]
    VarIntOutOfRange(u64),

    /// Connection ID longer than the permitted maximum
    #[error("invalid connection id length {0}")]
    InvalidConnectionIdLength(usize),

    /// Frame could not be decoded or encoded
    #[error("frame encoding error: {0}")]
    FrameEncoding(&'static str),

    /// Packet header could not be decoded
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// Peer broke a protocol rule
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// Inbound packet queue reached its configured capacity
    #[error("inbound packet buffer full")]
    BufferFull,

    /// Caller used the engine in a way the contract forbids
    #[error("contract violation: {0}")]
    ContractViolation(&'static str),

    /// Engine configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Wire error code the driver should close the connection with.
    pub fn transport_error(&self) -> TransportError {
        match self {
            Error::Transport(e) => *e,
            Error::Crypto(CryptoError::UnsupportedCipherSuite(_)) => {
                // handshake_failure alert
                TransportError::Crypto(40)
            }
            Error::Crypto(CryptoError::AuthenticationFailed) => TransportError::ProtocolViolation,
            Error::Crypto(_) => TransportError::InternalError,
            Error::VarIntOutOfRange(_) | Error::FrameEncoding(_) => {
                TransportError::FrameEncodingError
            }
            Error::InvalidConnectionIdLength(_) => TransportError::ProtocolViolation,
            Error::ContractViolation(_) | Error::InvalidConfig(_) => TransportError::InternalError,
            Error::InvalidStateTransition { .. } => {
                // unexpected_message alert
                TransportError::Crypto(10)
            }
            _ => TransportError::ProtocolViolation,
        }
    }

    /// True for errors that indicate a bug in the caller rather than a
    /// network condition.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ContractViolation(_)
                | Error::InvalidConfig(_)
                | Error::Crypto(CryptoError::KeyAlreadyInstalled(_))
        )
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}
