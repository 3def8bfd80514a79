//! # Connection State Machine (RFC 9000 Section 5, 10)
//!
//! Pure state machine: accepts decoded packets and locally produced frames,
//! produces [`Directive`]s. Nothing here blocks or performs I/O.
//!
//! ```text
//! Idle --begin_handshake--> Handshaking --handshake done--> Active
//!   \__________________________|_____________________________|
//!                              v
//!                SentDisconnect / ReceivedDisconnect
//! ```
//!
//! Inbound packets are queued with [`ConnectionStateMachine::buffer_inbound_packet`]
//! and processed one per call to
//! [`ConnectionStateMachine::process_inbound_frame`], which returns `None`
//! once the queue is empty.

#![forbid(unsafe_code)]

use super::directive::Directive;
use super::handshake::{Direction, HandshakeState, HandshakeStateMachine};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::frames::Frame;
use crate::packet::Packet;
use crate::tls::TlsMessageParser;
use crate::types::{Epoch, Side};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

// ============================================================================
// Connection State
// ============================================================================

/// Connection State (RFC 9000 Section 5)
#[derive(Debug)]
pub enum State {
    /// Created, handshake not started
    Idle,

    /// Handshake in progress
    Handshaking(HandshakeStateMachine),

    /// Handshake complete, connection active
    Active,

    /// This endpoint closed the connection
    SentDisconnect,

    /// The peer closed the connection
    ReceivedDisconnect,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Handshaking(_) => "handshaking",
            State::Active => "active",
            State::SentDisconnect => "sent_disconnect",
            State::ReceivedDisconnect => "received_disconnect",
        }
    }

    /// True once the connection has been closed by either side
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::SentDisconnect | State::ReceivedDisconnect)
    }
}

// ============================================================================
// Connection State Machine
// ============================================================================

pub struct ConnectionStateMachine {
    side: Side,
    config: Arc<EngineConfig>,
    state: State,

    /// TLS boundary, moved into the handshake machine by `begin_handshake`
    tls: Option<Box<dyn TlsMessageParser>>,

    /// Inbound packets awaiting processing, FIFO
    buffered: VecDeque<Packet>,

    /// 1-RTT packets a server received before the handshake completed
    deferred: VecDeque<Packet>,
}

impl std::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("side", &self.side)
            .field("state", &self.state)
            .field("buffered", &self.buffered.len())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

impl ConnectionStateMachine {
    /// Create a connection in the Idle state.
    ///
    /// Fails with [`Error::InvalidConfig`] when `config` does not validate.
    pub fn new(
        side: Side,
        config: Arc<EngineConfig>,
        tls: Box<dyn TlsMessageParser>,
    ) -> Result<Self> {
        if let Err(e) = config.check() {
            error!(%side, error = %e, "rejecting engine configuration");
            return Err(e);
        }
        Ok(Self {
            side,
            config,
            state: State::Idle,
            tls: Some(tls),
            buffered: VecDeque::new(),
            deferred: VecDeque::new(),
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handshake progress, or `None` outside the Handshaking state.
    pub fn handshake_state(&self) -> Option<HandshakeState> {
        match &self.state {
            State::Handshaking(hs) => Some(hs.state()),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active)
    }

    /// Packets waiting for `process_inbound_frame`, deferred ones included.
    pub fn buffered_packets(&self) -> usize {
        self.buffered.len() + self.deferred.len()
    }

    /// Idle -> Handshaking. Legal only from Idle.
    pub fn begin_handshake(&mut self) -> Result<()> {
        if !matches!(self.state, State::Idle) {
            return Err(Error::InvalidStateTransition {
                from: self.state.name(),
                to: "handshaking",
            });
        }
        let tls = self
            .tls
            .take()
            .ok_or(Error::ContractViolation("TLS parser already consumed"))?;

        let hs = HandshakeStateMachine::new(self.side, tls, &self.config);
        self.set_state(State::Handshaking(hs));
        Ok(())
    }

    /// Queue an inbound packet.
    ///
    /// Returns `Ok(false)` when the queue is full and the packet was dropped.
    pub fn buffer_inbound_packet(&mut self, packet: Packet) -> Result<bool> {
        if matches!(self.state, State::Idle) || self.state.is_terminal() {
            return Err(self.contract_violation("buffer_inbound_packet"));
        }
        if self.buffered_packets() >= self.config.max_buffered_packets {
            warn!(
                side = %self.side,
                packet_type = ?packet.packet_type(),
                limit = self.config.max_buffered_packets,
                "inbound packet queue full, dropping packet"
            );
            return Ok(false);
        }
        self.buffered.push_back(packet);
        Ok(true)
    }

    /// Process the frames of the next buffered inbound packet.
    ///
    /// Returns `None` when no packet is ready.
    pub fn process_inbound_frame(&mut self) -> Result<Option<Vec<Directive>>> {
        if matches!(self.state, State::Idle) || self.state.is_terminal() {
            return Err(self.contract_violation("process_inbound_frame"));
        }
        let Some(packet) = self.buffered.pop_front() else {
            return Ok(None);
        };

        let directives = match self.state {
            State::Handshaking(_) => self.handshake_inbound(packet)?,
            _ => self.active_inbound(&packet)?,
        };
        Ok(Some(directives))
    }

    /// Process a frame produced locally, to be sent at `epoch`.
    pub fn process_outbound_frame(&mut self, frame: Frame, epoch: Epoch) -> Result<Vec<Directive>> {
        if matches!(self.state, State::Idle) || self.state.is_terminal() {
            return Err(self.contract_violation("process_outbound_frame"));
        }
        trace!(side = %self.side, frame = frame.name(), %epoch, "outbound frame");

        match frame {
            Frame::Raw { .. } => Err(self.contract_violation("raw frame")),
            Frame::ConnectionClose(_) => {
                let mut directives = vec![Directive::emit(epoch, vec![frame])];
                directives.extend(self.disconnect()?);
                Ok(directives)
            }
            Frame::HandshakeDone if self.side.is_client() => {
                Err(Error::ProtocolViolation("client sent HANDSHAKE_DONE"))
            }
            frame => match &mut self.state {
                State::Handshaking(hs) => {
                    let directives = match frame {
                        Frame::Crypto(crypto) => {
                            hs.process_crypto_frame(&crypto, epoch, Direction::Outbound)?
                        }
                        frame @ (Frame::Padding(_) | Frame::Ping | Frame::Ack(_)) => {
                            vec![Directive::emit(epoch, vec![frame])]
                        }
                        _ => {
                            return Err(Error::ProtocolViolation(
                                "frame not permitted during the handshake",
                            ))
                        }
                    };
                    self.promote_if_done(directives)
                }
                _ => Ok(vec![Directive::emit(epoch, vec![frame])]),
            },
        }
    }

    /// Close the connection locally.
    pub fn disconnect(&mut self) -> Result<Vec<Directive>> {
        if self.state.is_terminal() {
            return Err(self.contract_violation("disconnect"));
        }
        self.set_state(State::SentDisconnect);
        self.buffered.clear();
        self.deferred.clear();
        Ok(vec![Directive::Disconnect])
    }

    // ------------------------------------------------------------------------
    // Handshaking
    // ------------------------------------------------------------------------

    fn handshake_inbound(&mut self, packet: Packet) -> Result<Vec<Directive>> {
        let State::Handshaking(hs) = &mut self.state else {
            return Err(Error::ContractViolation("not handshaking"));
        };

        if let Packet::Short(_) = packet {
            if self.side.is_server() {
                trace!("deferring 1-RTT packet until the handshake completes");
                self.deferred.push_back(packet);
                return Ok(Vec::new());
            }
            if !packet.frames().contains(&Frame::HandshakeDone) {
                return Err(Error::ProtocolViolation(
                    "1-RTT packet before HANDSHAKE_DONE",
                ));
            }
            let directives = hs.process_handshake_done()?;
            // The rest of the packet is handled once Active
            self.buffered.push_front(packet);
            return self.promote_if_done(directives);
        }

        let epoch = packet
            .epoch()
            .ok_or(Error::ProtocolViolation("packet without an epoch"))?;

        let mut directives = Vec::new();
        for frame in packet.frames() {
            trace!(side = %self.side, frame = frame.name(), %epoch, "inbound frame");
            match frame {
                Frame::Padding(_) | Frame::Ping => {}
                Frame::Ack(_) => trace!("ack handled by loss recovery"),
                Frame::Crypto(crypto) => {
                    directives.extend(hs.process_crypto_frame(crypto, epoch, Direction::Inbound)?);
                }
                Frame::HandshakeDone => {
                    if self.side.is_server() {
                        return Err(Error::ProtocolViolation("server received HANDSHAKE_DONE"));
                    }
                    directives.extend(hs.process_handshake_done()?);
                }
                Frame::ConnectionClose(close) => {
                    debug!(
                        side = %self.side,
                        error_code = close.error_code,
                        "peer closed connection during handshake"
                    );
                    directives.push(self.peer_closed());
                    return Ok(directives);
                }
                Frame::Raw { .. } => return Err(self.contract_violation("raw frame")),
                _ => {
                    return Err(Error::ProtocolViolation(
                        "frame not permitted during the handshake",
                    ))
                }
            }
        }

        self.promote_if_done(directives)
    }

    /// Handshaking -> Active once the handshake machine reports done.
    fn promote_if_done(&mut self, mut directives: Vec<Directive>) -> Result<Vec<Directive>> {
        let done = matches!(&self.state, State::Handshaking(hs) if hs.is_done());
        if done {
            self.set_state(State::Active);
            while let Some(packet) = self.deferred.pop_back() {
                self.buffered.push_front(packet);
            }
            directives.push(Directive::InstallStreamMuxer);
        }
        Ok(directives)
    }

    // ------------------------------------------------------------------------
    // Active
    // ------------------------------------------------------------------------

    fn active_inbound(&mut self, packet: &Packet) -> Result<Vec<Directive>> {
        let epoch = packet.epoch().unwrap_or(Epoch::Application);
        let mut directives = Vec::new();

        for frame in packet.frames() {
            trace!(side = %self.side, frame = frame.name(), %epoch, "inbound frame");
            match frame {
                Frame::Ack(_) => {}
                Frame::Stream(_) | Frame::Crypto(_) | Frame::NewToken(_) => {
                    directives.push(Directive::ForwardFrame(frame.clone()));
                }
                Frame::ConnectionClose(close) => {
                    debug!(
                        side = %self.side,
                        error_code = close.error_code,
                        "peer closed connection"
                    );
                    directives.push(self.peer_closed());
                    return Ok(directives);
                }
                Frame::HandshakeDone => {
                    if self.side.is_server() {
                        return Err(Error::ProtocolViolation("server received HANDSHAKE_DONE"));
                    }
                }
                Frame::Padding(len) => trace!(len, "padding"),
                Frame::Ping => debug!(side = %self.side, "ping"),
                Frame::MaxData(_)
                | Frame::MaxStreamData(_)
                | Frame::MaxStreams(_)
                | Frame::DataBlocked(_)
                | Frame::StreamDataBlocked(_)
                | Frame::StreamsBlocked(_)
                | Frame::ResetStream(_)
                | Frame::StopSending(_) => {
                    debug!(frame = frame.name(), "flow control handler not yet implemented");
                }
                Frame::NewConnectionId(_) | Frame::RetireConnectionId(_) => {
                    warn!(frame = frame.name(), "connection ID management not yet implemented");
                }
                Frame::PathChallenge(_) | Frame::PathResponse(_) => {
                    warn!(frame = frame.name(), "path validation not yet implemented");
                }
                Frame::Raw { .. } => return Err(self.contract_violation("raw frame")),
            }
        }

        if !directives.iter().any(Directive::is_emit) {
            directives.push(Directive::emit(Epoch::Application, Vec::new()));
        }
        Ok(directives)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn peer_closed(&mut self) -> Directive {
        self.set_state(State::ReceivedDisconnect);
        self.buffered.clear();
        self.deferred.clear();
        Directive::Disconnect
    }

    fn set_state(&mut self, to: State) {
        debug!(side = %self.side, from = self.state.name(), to = to.name(), "connection transition");
        self.state = to;
    }

    fn contract_violation(&self, operation: &'static str) -> Error {
        error!(
            side = %self.side,
            state = self.state.name(),
            operation,
            "operation not permitted in this state"
        );
        Error::ContractViolation(operation)
    }
}
