//! # QUIC Connection State Machine (RFC 9000 Section 5, RFC 9001 Section 4)
//!
//! Drives one connection from Idle through the handshake to Active and
//! dispatches frames. Output is a list of directives for the driver.

pub mod crypto_stream;
pub mod directive;
pub mod handshake;
pub mod state;


pub use crypto_stream::CryptoStream;
pub use directive::{Directive, OutboundPacket};
pub use handshake::{Direction, HandshakeState, HandshakeStateMachine};
pub use state::{ConnectionStateMachine, State};
