//! # QUIC Frames (RFC 9000 Section 12.4, 19)
//!
//! Every frame type of RFC 9000 as an owned value. Decoded data fields are
//! `Bytes` slices of the decrypted payload.

pub mod parse;
pub mod types;

pub use parse::{DefaultFrameParser, FrameIterator, FrameParser};
pub use types::*;
