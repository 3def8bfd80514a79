//! # Handshake Sequencing (RFC 9001 Section 4)
//!
//! [`HandshakeStateMachine`] consumes CRYPTO frame bytes in both directions
//! and advances through the TLS 1.3 message sequence in a fixed order:
//!
//! ```text
//! Idle -> ClientHello -> ServerHello -> EncryptedExtensions -> Certificate
//!      -> CertificateVerify -> server Finished -> client Finished -> Done
//! ```
//!
//! Each message must come from the endpoint that authors it. Inbound bytes
//! are written by the peer, outbound bytes by this endpoint. The TLS engine
//! behind [`TlsMessageParser`] only finds message boundaries; every
//! protocol decision is made here and returned as [`Directive`]s.

#![forbid(unsafe_code)]

use super::crypto_stream::CryptoStream;
use super::directive::Directive;
use crate::config::EngineConfig;
use crate::error::{Error, Result, TransportError};
use crate::frames::{CryptoFrame, Frame, NewTokenFrame};
use crate::tls::{HandshakeMessageKind, TlsMessageParser, TlsParse};
use crate::types::{Epoch, Side};
use bytes::{Buf, Bytes, BytesMut};
use rand::RngCore;
use tracing::{debug, trace};

/// Progress through the handshake. Ordered: a later state never precedes
/// an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandshakeState {
    Idle,
    ProcessedClientHello,
    ProcessedServerHello,
    ProcessedEncryptedExtensions,
    ProcessedCertificate,
    ProcessedCertVerify,
    ProcessedServerFinished,
    ProcessedClientFinished,
    ProcessedDone,
}

impl HandshakeState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ProcessedClientHello => "processed_client_hello",
            Self::ProcessedServerHello => "processed_server_hello",
            Self::ProcessedEncryptedExtensions => "processed_encrypted_extensions",
            Self::ProcessedCertificate => "processed_certificate",
            Self::ProcessedCertVerify => "processed_cert_verify",
            Self::ProcessedServerFinished => "processed_server_finished",
            Self::ProcessedClientFinished => "processed_client_finished",
            Self::ProcessedDone => "processed_done",
        }
    }

    /// The TLS message that leaves this state and the endpoint writing it.
    /// `None` once no further TLS message is expected.
    pub fn expected_message(self) -> Option<(HandshakeMessageKind, Side)> {
        let kind = match self {
            Self::Idle => HandshakeMessageKind::ClientHello,
            Self::ProcessedClientHello => HandshakeMessageKind::ServerHello,
            Self::ProcessedServerHello => HandshakeMessageKind::EncryptedExtensions,
            Self::ProcessedEncryptedExtensions => HandshakeMessageKind::Certificate,
            Self::ProcessedCertificate => HandshakeMessageKind::CertificateVerify,
            Self::ProcessedCertVerify | Self::ProcessedServerFinished => {
                HandshakeMessageKind::Finished
            }
            Self::ProcessedClientFinished | Self::ProcessedDone => return None,
        };
        // Finished is written by the server first, then by the client
        let author = kind.author().unwrap_or(match self {
            Self::ProcessedServerFinished => Side::Client,
            _ => Side::Server,
        });
        Some((kind, author))
    }

    /// State reached by the next TLS message or HANDSHAKE_DONE.
    pub fn successor(self) -> Option<Self> {
        let next = match self {
            Self::Idle => Self::ProcessedClientHello,
            Self::ProcessedClientHello => Self::ProcessedServerHello,
            Self::ProcessedServerHello => Self::ProcessedEncryptedExtensions,
            Self::ProcessedEncryptedExtensions => Self::ProcessedCertificate,
            Self::ProcessedCertificate => Self::ProcessedCertVerify,
            Self::ProcessedCertVerify => Self::ProcessedServerFinished,
            Self::ProcessedServerFinished => Self::ProcessedClientFinished,
            Self::ProcessedClientFinished => Self::ProcessedDone,
            Self::ProcessedDone => return None,
        };
        Some(next)
    }

    fn transition_error(self) -> Error {
        Error::InvalidStateTransition {
            from: self.name(),
            to: self.successor().map_or("none", Self::name),
        }
    }
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which way a CRYPTO frame travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Received from the peer
    Inbound,
    /// Produced by the local TLS engine
    Outbound,
}

impl Direction {
    fn index(self) -> usize {
        match self {
            Direction::Inbound => 0,
            Direction::Outbound => 1,
        }
    }
}

/// Epoch whose CRYPTO stream carries a message.
fn message_epoch(kind: HandshakeMessageKind) -> Epoch {
    match kind {
        HandshakeMessageKind::ClientHello | HandshakeMessageKind::ServerHello => Epoch::Initial,
        _ => Epoch::Handshake,
    }
}

/// Per-direction CRYPTO state.
#[derive(Debug, Default)]
struct CryptoDirection {
    streams: [CryptoStream; 3],
    /// Contiguous bytes not yet claimed by a message
    pending: BytesMut,
    /// Stream offset of the next message, per epoch
    consumed: [u64; 3],
}

pub struct HandshakeStateMachine {
    side: Side,
    state: HandshakeState,
    tls: Box<dyn TlsMessageParser>,
    directions: [CryptoDirection; 2],
    max_crypto_buffer: usize,
    new_token_length: usize,
}

impl std::fmt::Debug for HandshakeStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeStateMachine")
            .field("side", &self.side)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl HandshakeStateMachine {
    pub fn new(side: Side, tls: Box<dyn TlsMessageParser>, config: &EngineConfig) -> Self {
        Self {
            side,
            state: HandshakeState::Idle,
            tls,
            directions: Default::default(),
            max_crypto_buffer: config.max_crypto_buffer,
            new_token_length: config.new_token_length,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::ProcessedDone
    }

    /// Feed one CRYPTO frame and process every message it completes.
    ///
    /// Returns no directives while a message is still incomplete.
    pub fn process_crypto_frame(
        &mut self,
        frame: &CryptoFrame,
        epoch: Epoch,
        direction: Direction,
    ) -> Result<Vec<Directive>> {
        let author = match direction {
            Direction::Inbound => self.side.opposite(),
            Direction::Outbound => self.side,
        };
        let max = self.max_crypto_buffer;
        let dir = &mut self.directions[direction.index()];

        let contiguous = dir.streams[epoch.index()].insert(frame.offset, frame.data.clone(), max)?;
        dir.pending.extend_from_slice(&contiguous);
        if dir.pending.len() > max {
            return Err(Error::Transport(TransportError::CryptoBufferExceeded));
        }

        trace!(
            side = %self.side,
            %epoch,
            ?direction,
            offset = frame.offset,
            len = frame.data.len(),
            buffered = dir.pending.len(),
            "crypto frame"
        );

        let mut directives = Vec::new();
        let mut processed_any = false;

        while !self.directions[direction.index()].pending.is_empty() {
            let pending_len = self.directions[direction.index()].pending.len();
            let Some((kind, expected_author)) = self.state.expected_message() else {
                return Err(Error::UnexpectedTrailingBytes(pending_len));
            };
            if expected_author != author {
                if processed_any {
                    return Err(Error::UnexpectedTrailingBytes(pending_len));
                }
                return Err(self.state.transition_error());
            }

            let dir = &mut self.directions[direction.index()];
            let message = match self.tls.parse(kind, &dir.pending) {
                TlsParse::NeedMoreData => break,
                TlsParse::Invalid => return Err(self.state.transition_error()),
                TlsParse::Message(message) => message,
            };
            if message.is_empty() || message.len() > dir.pending.len() {
                return Err(Error::ContractViolation("TLS parser returned a bad message length"));
            }
            dir.pending.advance(message.len());

            let msg_epoch = message_epoch(kind);
            let offset = dir.consumed[msg_epoch.index()];
            dir.consumed[msg_epoch.index()] += message.len() as u64;

            directives.extend(self.advance(kind, direction, offset, message)?);
            processed_any = true;
        }

        Ok(directives)
    }

    /// Handle HANDSHAKE_DONE, the only way into `ProcessedDone`.
    pub fn process_handshake_done(&mut self) -> Result<Vec<Directive>> {
        if self.state != HandshakeState::ProcessedClientFinished {
            return Err(Error::InvalidStateTransition {
                from: self.state.name(),
                to: HandshakeState::ProcessedDone.name(),
            });
        }
        self.transition(HandshakeState::ProcessedDone);
        Ok(Vec::new())
    }

    fn transition(&mut self, to: HandshakeState) {
        debug!(side = %self.side, from = %self.state, %to, "handshake transition");
        self.state = to;
    }

    /// Move past one complete message and produce the role's directives.
    fn advance(
        &mut self,
        kind: HandshakeMessageKind,
        direction: Direction,
        offset: u64,
        message: Bytes,
    ) -> Result<Vec<Directive>> {
        let next = self.state.successor().ok_or_else(|| self.state.transition_error())?;
        self.transition(next);

        let epoch = message_epoch(kind);
        let crypto = Frame::Crypto(CryptoFrame {
            offset,
            data: message,
        });

        let mut directives = Vec::new();
        match (self.side, direction, next) {
            (Side::Client, Direction::Outbound, HandshakeState::ProcessedClientHello) => {
                directives.push(Directive::ForwardFrame(crypto));
            }
            (_, Direction::Outbound, _) => {
                directives.push(Directive::emit(epoch, vec![crypto]));
            }
            (Side::Server, Direction::Inbound, HandshakeState::ProcessedClientFinished) => {
                directives.push(Directive::emit(
                    Epoch::Application,
                    vec![Frame::HandshakeDone, self.new_token()],
                ));
            }
            // Peer messages need no action beyond the state change
            _ => {}
        }

        match next {
            HandshakeState::ProcessedServerHello => directives.extend(server_hello_directives()),
            HandshakeState::ProcessedServerFinished | HandshakeState::ProcessedClientFinished => {
                directives.push(Directive::AllowBufferedFlush(Epoch::Application));
            }
            _ => {}
        }

        if self.side == Side::Server && next == HandshakeState::ProcessedClientFinished {
            directives.extend(self.process_handshake_done()?);
        }
        Ok(directives)
    }

    fn new_token(&self) -> Frame {
        let mut token = vec![0u8; self.new_token_length];
        rand::thread_rng().fill_bytes(&mut token);
        Frame::NewToken(NewTokenFrame {
            token: Bytes::from(token),
        })
    }
}

/// ServerHello switches both endpoints from Initial to Handshake keys.
fn server_hello_directives() -> [Directive; 3] {
    [
        Directive::AllowBufferedFlush(Epoch::Handshake),
        Directive::UpdateDcid,
        Directive::DropKeys(Epoch::Initial),
    ]
}
