//! # QUIC Frame Types (RFC 9000 Section 19)
//!
//! QUIC packets contain one or more frames carrying control or application data.
//!
//! ## Frame Classification:
//! - **ACK-eliciting**: everything except ACK, CONNECTION_CLOSE and PADDING
//! - **Non-ACK-eliciting**: ACK, CONNECTION_CLOSE, PADDING
//!
//! Frame types whose low bits carry flags (STREAM, ACK, MAX_STREAMS,
//! STREAMS_BLOCKED, CONNECTION_CLOSE) do not store the type byte. It is
//! recomputed from the variant's fields by [`Frame::frame_type`].

#![forbid(unsafe_code)]

use crate::error::{Error, Result};
use crate::types::{ConnectionId, Epoch, StatelessResetToken};
use crate::varint::{put_varint, varint_len};
use bytes::{BufMut, Bytes, BytesMut};

/// Frame Type Constants (RFC 9000 Section 19)
pub const FRAME_TYPE_PADDING: u64 = 0x00;
pub const FRAME_TYPE_PING: u64 = 0x01;
pub const FRAME_TYPE_ACK: u64 = 0x02;
pub const FRAME_TYPE_ACK_ECN: u64 = 0x03;
pub const FRAME_TYPE_RESET_STREAM: u64 = 0x04;
pub const FRAME_TYPE_STOP_SENDING: u64 = 0x05;
pub const FRAME_TYPE_CRYPTO: u64 = 0x06;
pub const FRAME_TYPE_NEW_TOKEN: u64 = 0x07;
pub const FRAME_TYPE_STREAM: u64 = 0x08; // 0x08-0x0f
pub const FRAME_TYPE_MAX_DATA: u64 = 0x10;
pub const FRAME_TYPE_MAX_STREAM_DATA: u64 = 0x11;
pub const FRAME_TYPE_MAX_STREAMS_BIDI: u64 = 0x12;
pub const FRAME_TYPE_MAX_STREAMS_UNI: u64 = 0x13;
pub const FRAME_TYPE_DATA_BLOCKED: u64 = 0x14;
pub const FRAME_TYPE_STREAM_DATA_BLOCKED: u64 = 0x15;
pub const FRAME_TYPE_STREAMS_BLOCKED_BIDI: u64 = 0x16;
pub const FRAME_TYPE_STREAMS_BLOCKED_UNI: u64 = 0x17;
pub const FRAME_TYPE_NEW_CONNECTION_ID: u64 = 0x18;
pub const FRAME_TYPE_RETIRE_CONNECTION_ID: u64 = 0x19;
pub const FRAME_TYPE_PATH_CHALLENGE: u64 = 0x1a;
pub const FRAME_TYPE_PATH_RESPONSE: u64 = 0x1b;
pub const FRAME_TYPE_CONNECTION_CLOSE_TRANSPORT: u64 = 0x1c;
pub const FRAME_TYPE_CONNECTION_CLOSE_APPLICATION: u64 = 0x1d;
pub const FRAME_TYPE_HANDSHAKE_DONE: u64 = 0x1e;

/// STREAM Frame Flag Bits (RFC 9000 Section 19.8)
///
/// The STREAM frame type has flags encoded in the type byte (0x08-0x0f):
/// - Bit 0 (FIN): Last frame in stream
/// - Bit 1 (LEN): Length field present
/// - Bit 2 (OFF): Offset field present
pub const STREAM_FRAME_BIT_FIN: u64 = 0x01;
pub const STREAM_FRAME_BIT_LEN: u64 = 0x02;
pub const STREAM_FRAME_BIT_OFF: u64 = 0x04;

/// ACK Frame (RFC 9000 Section 19.3)
///
/// Acknowledges receipt of packets. Contains ranges of acknowledged packet numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckFrame {
    /// Largest packet number being acknowledged
    pub largest_acked: u64,

    /// Encoded ACK delay (scaled by the peer's ack_delay_exponent)
    pub ack_delay: u64,

    /// First ACK Range (number of packets before largest_acked)
    pub first_ack_range: u64,

    /// Additional ACK Ranges (Gap, Range pairs)
    pub ack_ranges: tinyvec::TinyVec<[AckRange; 8]>,

    /// ECN counts (only present in ACK frames of type 0x03)
    pub ecn_counts: Option<EcnCounts>,
}

/// ACK Range (RFC 9000 Section 19.3.1)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckRange {
    /// Gap before this range (packet numbers NOT acknowledged)
    pub gap: u64,

    /// Length of this range (packet numbers acknowledged)
    pub length: u64,
}

/// ECN Counts (RFC 9000 Section 19.3.2)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EcnCounts {
    pub ect0_count: u64,
    pub ect1_count: u64,
    pub ce_count: u64,
}

/// RESET_STREAM Frame (RFC 9000 Section 19.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetStreamFrame {
    pub stream_id: u64,
    pub application_error_code: u64,
    pub final_size: u64,
}

/// STOP_SENDING Frame (RFC 9000 Section 19.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSendingFrame {
    pub stream_id: u64,
    pub application_error_code: u64,
}

/// CRYPTO Frame (RFC 9000 Section 19.6)
///
/// Carries TLS handshake bytes at an offset in the epoch's crypto stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoFrame {
    pub offset: u64,
    pub data: Bytes,
}

/// NEW_TOKEN Frame (RFC 9000 Section 19.7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTokenFrame {
    pub token: Bytes,
}

/// STREAM Frame (RFC 9000 Section 19.8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub stream_id: u64,

    /// Byte offset in the stream.
    pub offset: u64,

    /// Whether an Offset field is written. A non-zero offset is always
    /// written; this keeps an explicit zero offset from a parsed frame.
    pub has_offset: bool,

    /// Whether a Length field is written. Without one the data runs to the
    /// end of the packet, so the frame must be last.
    pub has_length: bool,

    pub fin: bool,
    pub data: Bytes,
}

impl StreamFrame {
    /// OFF bit of the frame type.
    pub fn writes_offset(&self) -> bool {
        self.has_offset || self.offset > 0
    }
}

/// MAX_DATA Frame (RFC 9000 Section 19.9)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxDataFrame {
    pub maximum_data: u64,
}

/// MAX_STREAM_DATA Frame (RFC 9000 Section 19.10)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxStreamDataFrame {
    pub stream_id: u64,
    pub maximum_stream_data: u64,
}

/// MAX_STREAMS Frame (RFC 9000 Section 19.11)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxStreamsFrame {
    /// 0x12 when true, 0x13 otherwise
    pub bidirectional: bool,
    pub maximum_streams: u64,
}

/// DATA_BLOCKED Frame (RFC 9000 Section 19.12)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlockedFrame {
    pub maximum_data: u64,
}

/// STREAM_DATA_BLOCKED Frame (RFC 9000 Section 19.13)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDataBlockedFrame {
    pub stream_id: u64,
    pub maximum_stream_data: u64,
}

/// STREAMS_BLOCKED Frame (RFC 9000 Section 19.14)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamsBlockedFrame {
    /// 0x16 when true, 0x17 otherwise
    pub bidirectional: bool,
    pub maximum_streams: u64,
}

/// NEW_CONNECTION_ID Frame (RFC 9000 Section 19.15)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnectionIdFrame {
    pub sequence_number: u64,
    pub retire_prior_to: u64,
    pub connection_id: ConnectionId,
    pub stateless_reset_token: StatelessResetToken,
}

/// RETIRE_CONNECTION_ID Frame (RFC 9000 Section 19.16)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetireConnectionIdFrame {
    pub sequence_number: u64,
}

/// PATH_CHALLENGE Frame (RFC 9000 Section 19.17)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathChallengeFrame {
    pub data: [u8; 8],
}

/// PATH_RESPONSE Frame (RFC 9000 Section 19.18)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathResponseFrame {
    pub data: [u8; 8],
}

/// CONNECTION_CLOSE Frame (RFC 9000 Section 19.19)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCloseFrame {
    pub error_code: u64,

    /// Triggering frame type. `Some` selects the transport variant (0x1c),
    /// `None` the application variant (0x1d), which has no such field.
    pub frame_type: Option<u64>,

    pub reason: Bytes,
}

impl ConnectionCloseFrame {
    pub fn is_application(&self) -> bool {
        self.frame_type.is_none()
    }
}

/// A QUIC frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A run of consecutive PADDING bytes, coalesced on decode
    Padding(usize),
    Ping,
    Ack(AckFrame),
    ResetStream(ResetStreamFrame),
    StopSending(StopSendingFrame),
    Crypto(CryptoFrame),
    NewToken(NewTokenFrame),
    Stream(StreamFrame),
    MaxData(MaxDataFrame),
    MaxStreamData(MaxStreamDataFrame),
    MaxStreams(MaxStreamsFrame),
    DataBlocked(DataBlockedFrame),
    StreamDataBlocked(StreamDataBlockedFrame),
    StreamsBlocked(StreamsBlockedFrame),
    NewConnectionId(NewConnectionIdFrame),
    RetireConnectionId(RetireConnectionIdFrame),
    PathChallenge(PathChallengeFrame),
    PathResponse(PathResponseFrame),
    ConnectionClose(ConnectionCloseFrame),
    HandshakeDone,

    /// Pre-framed bytes for a type this crate does not model. Only ever
    /// built locally: the decoder rejects unknown frame types.
    Raw { frame_type: u64, payload: Bytes },
}

impl Frame {
    /// Frame type as written on the wire, flags included.
    pub fn frame_type(&self) -> u64 {
        match self {
            Frame::Padding(_) => FRAME_TYPE_PADDING,
            Frame::Ping => FRAME_TYPE_PING,
            Frame::Ack(ack) => {
                if ack.ecn_counts.is_some() {
                    FRAME_TYPE_ACK_ECN
                } else {
                    FRAME_TYPE_ACK
                }
            }
            Frame::ResetStream(_) => FRAME_TYPE_RESET_STREAM,
            Frame::StopSending(_) => FRAME_TYPE_STOP_SENDING,
            Frame::Crypto(_) => FRAME_TYPE_CRYPTO,
            Frame::NewToken(_) => FRAME_TYPE_NEW_TOKEN,
            Frame::Stream(stream) => {
                let mut ty = FRAME_TYPE_STREAM;
                if stream.writes_offset() {
                    ty |= STREAM_FRAME_BIT_OFF;
                }
                if stream.has_length {
                    ty |= STREAM_FRAME_BIT_LEN;
                }
                if stream.fin {
                    ty |= STREAM_FRAME_BIT_FIN;
                }
                ty
            }
            Frame::MaxData(_) => FRAME_TYPE_MAX_DATA,
            Frame::MaxStreamData(_) => FRAME_TYPE_MAX_STREAM_DATA,
            Frame::MaxStreams(f) => {
                if f.bidirectional {
                    FRAME_TYPE_MAX_STREAMS_BIDI
                } else {
                    FRAME_TYPE_MAX_STREAMS_UNI
                }
            }
            Frame::DataBlocked(_) => FRAME_TYPE_DATA_BLOCKED,
            Frame::StreamDataBlocked(_) => FRAME_TYPE_STREAM_DATA_BLOCKED,
            Frame::StreamsBlocked(f) => {
                if f.bidirectional {
                    FRAME_TYPE_STREAMS_BLOCKED_BIDI
                } else {
                    FRAME_TYPE_STREAMS_BLOCKED_UNI
                }
            }
            Frame::NewConnectionId(_) => FRAME_TYPE_NEW_CONNECTION_ID,
            Frame::RetireConnectionId(_) => FRAME_TYPE_RETIRE_CONNECTION_ID,
            Frame::PathChallenge(_) => FRAME_TYPE_PATH_CHALLENGE,
            Frame::PathResponse(_) => FRAME_TYPE_PATH_RESPONSE,
            Frame::ConnectionClose(close) => {
                if close.is_application() {
                    FRAME_TYPE_CONNECTION_CLOSE_APPLICATION
                } else {
                    FRAME_TYPE_CONNECTION_CLOSE_TRANSPORT
                }
            }
            Frame::HandshakeDone => FRAME_TYPE_HANDSHAKE_DONE,
            Frame::Raw { frame_type, .. } => *frame_type,
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Padding(_) => "PADDING",
            Frame::Ping => "PING",
            Frame::Ack(_) => "ACK",
            Frame::ResetStream(_) => "RESET_STREAM",
            Frame::StopSending(_) => "STOP_SENDING",
            Frame::Crypto(_) => "CRYPTO",
            Frame::NewToken(_) => "NEW_TOKEN",
            Frame::Stream(_) => "STREAM",
            Frame::MaxData(_) => "MAX_DATA",
            Frame::MaxStreamData(_) => "MAX_STREAM_DATA",
            Frame::MaxStreams(_) => "MAX_STREAMS",
            Frame::DataBlocked(_) => "DATA_BLOCKED",
            Frame::StreamDataBlocked(_) => "STREAM_DATA_BLOCKED",
            Frame::StreamsBlocked(_) => "STREAMS_BLOCKED",
            Frame::NewConnectionId(_) => "NEW_CONNECTION_ID",
            Frame::RetireConnectionId(_) => "RETIRE_CONNECTION_ID",
            Frame::PathChallenge(_) => "PATH_CHALLENGE",
            Frame::PathResponse(_) => "PATH_RESPONSE",
            Frame::ConnectionClose(_) => "CONNECTION_CLOSE",
            Frame::HandshakeDone => "HANDSHAKE_DONE",
            Frame::Raw { .. } => "RAW",
        }
    }

    /// Check if frame is ACK-eliciting (RFC 9000 Section 13.2)
    pub fn is_ack_eliciting(&self) -> bool {
        !matches!(
            self,
            Frame::Padding(_) | Frame::Ack(_) | Frame::ConnectionClose(_)
        )
    }

    /// Whether the frame may appear in a packet of `epoch`
    /// (RFC 9000 Section 12.4, Table 3).
    ///
    /// Initial and Handshake packets carry only PADDING, PING, ACK, CRYPTO
    /// and the transport CONNECTION_CLOSE.
    pub fn is_allowed_in(&self, epoch: Epoch) -> bool {
        match epoch {
            Epoch::Application => true,
            Epoch::Initial | Epoch::Handshake => match self {
                Frame::Padding(_) | Frame::Ping | Frame::Ack(_) | Frame::Crypto(_) => true,
                Frame::ConnectionClose(close) => !close.is_application(),
                _ => false,
            },
        }
    }

    /// Append the frame to `buf`, returning the bytes written.
    ///
    /// On error `buf` is left as it was.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<usize> {
        let start = buf.len();
        match self.write(buf) {
            Ok(()) => Ok(buf.len() - start),
            Err(e) => {
                buf.truncate(start);
                Err(e)
            }
        }
    }

    /// Serialized size of the frame.
    pub fn encoded_len(&self) -> usize {
        let ty = varint_len(self.frame_type());
        match self {
            Frame::Padding(n) => *n,
            Frame::Ping | Frame::HandshakeDone => ty,
            Frame::Ack(ack) => {
                let mut len = ty
                    + varint_len(ack.largest_acked)
                    + varint_len(ack.ack_delay)
                    + varint_len(ack.ack_ranges.len() as u64)
                    + varint_len(ack.first_ack_range);
                for range in ack.ack_ranges.iter() {
                    len += varint_len(range.gap) + varint_len(range.length);
                }
                if let Some(ecn) = &ack.ecn_counts {
                    len += varint_len(ecn.ect0_count)
                        + varint_len(ecn.ect1_count)
                        + varint_len(ecn.ce_count);
                }
                len
            }
            Frame::ResetStream(f) => {
                ty + varint_len(f.stream_id)
                    + varint_len(f.application_error_code)
                    + varint_len(f.final_size)
            }
            Frame::StopSending(f) => {
                ty + varint_len(f.stream_id) + varint_len(f.application_error_code)
            }
            Frame::Crypto(f) => {
                ty + varint_len(f.offset) + varint_len(f.data.len() as u64) + f.data.len()
            }
            Frame::NewToken(f) => ty + varint_len(f.token.len() as u64) + f.token.len(),
            Frame::Stream(f) => {
                let mut len = ty + varint_len(f.stream_id) + f.data.len();
                if f.writes_offset() {
                    len += varint_len(f.offset);
                }
                if f.has_length {
                    len += varint_len(f.data.len() as u64);
                }
                len
            }
            Frame::MaxData(f) => ty + varint_len(f.maximum_data),
            Frame::MaxStreamData(f) => {
                ty + varint_len(f.stream_id) + varint_len(f.maximum_stream_data)
            }
            Frame::MaxStreams(f) => ty + varint_len(f.maximum_streams),
            Frame::DataBlocked(f) => ty + varint_len(f.maximum_data),
            Frame::StreamDataBlocked(f) => {
                ty + varint_len(f.stream_id) + varint_len(f.maximum_stream_data)
            }
            Frame::StreamsBlocked(f) => ty + varint_len(f.maximum_streams),
            Frame::NewConnectionId(f) => {
                ty + varint_len(f.sequence_number)
                    + varint_len(f.retire_prior_to)
                    + 1
                    + f.connection_id.len()
                    + 16
            }
            Frame::RetireConnectionId(f) => ty + varint_len(f.sequence_number),
            Frame::PathChallenge(_) | Frame::PathResponse(_) => ty + 8,
            Frame::ConnectionClose(f) => {
                ty + varint_len(f.error_code)
                    + f.frame_type.map_or(0, varint_len)
                    + varint_len(f.reason.len() as u64)
                    + f.reason.len()
            }
            Frame::Raw { payload, .. } => ty + payload.len(),
        }
    }

    fn write(&self, buf: &mut BytesMut) -> Result<()> {
        if let Frame::Padding(n) = self {
            buf.put_bytes(0, *n);
            return Ok(());
        }

        put_varint(buf, self.frame_type())?;

        match self {
            Frame::Padding(_) | Frame::Ping | Frame::HandshakeDone => {}
            Frame::Ack(ack) => {
                if ack.first_ack_range > ack.largest_acked {
                    return Err(Error::FrameEncoding("first ACK range exceeds largest acknowledged"));
                }
                put_varint(buf, ack.largest_acked)?;
                put_varint(buf, ack.ack_delay)?;
                put_varint(buf, ack.ack_ranges.len() as u64)?;
                put_varint(buf, ack.first_ack_range)?;
                for range in ack.ack_ranges.iter() {
                    put_varint(buf, range.gap)?;
                    put_varint(buf, range.length)?;
                }
                if let Some(ecn) = &ack.ecn_counts {
                    put_varint(buf, ecn.ect0_count)?;
                    put_varint(buf, ecn.ect1_count)?;
                    put_varint(buf, ecn.ce_count)?;
                }
            }
            Frame::ResetStream(f) => {
                put_varint(buf, f.stream_id)?;
                put_varint(buf, f.application_error_code)?;
                put_varint(buf, f.final_size)?;
            }
            Frame::StopSending(f) => {
                put_varint(buf, f.stream_id)?;
                put_varint(buf, f.application_error_code)?;
            }
            Frame::Crypto(f) => {
                put_varint(buf, f.offset)?;
                put_varint(buf, f.data.len() as u64)?;
                buf.put_slice(&f.data);
            }
            Frame::NewToken(f) => {
                if f.token.is_empty() {
                    return Err(Error::FrameEncoding("empty NEW_TOKEN"));
                }
                put_varint(buf, f.token.len() as u64)?;
                buf.put_slice(&f.token);
            }
            Frame::Stream(f) => {
                put_varint(buf, f.stream_id)?;
                if f.writes_offset() {
                    put_varint(buf, f.offset)?;
                }
                if f.has_length {
                    put_varint(buf, f.data.len() as u64)?;
                }
                buf.put_slice(&f.data);
            }
            Frame::MaxData(f) => put_varint(buf, f.maximum_data)?,
            Frame::MaxStreamData(f) => {
                put_varint(buf, f.stream_id)?;
                put_varint(buf, f.maximum_stream_data)?;
            }
            Frame::MaxStreams(f) => put_varint(buf, f.maximum_streams)?,
            Frame::DataBlocked(f) => put_varint(buf, f.maximum_data)?,
            Frame::StreamDataBlocked(f) => {
                put_varint(buf, f.stream_id)?;
                put_varint(buf, f.maximum_stream_data)?;
            }
            Frame::StreamsBlocked(f) => put_varint(buf, f.maximum_streams)?,
            Frame::NewConnectionId(f) => {
                if f.connection_id.is_empty() {
                    return Err(Error::FrameEncoding("zero-length connection id"));
                }
                if f.retire_prior_to > f.sequence_number {
                    return Err(Error::FrameEncoding("retire_prior_to exceeds sequence number"));
                }
                put_varint(buf, f.sequence_number)?;
                put_varint(buf, f.retire_prior_to)?;
                buf.put_u8(f.connection_id.len() as u8);
                buf.put_slice(f.connection_id.as_bytes());
                buf.put_slice(&f.stateless_reset_token);
            }
            Frame::RetireConnectionId(f) => put_varint(buf, f.sequence_number)?,
            Frame::PathChallenge(f) => buf.put_slice(&f.data),
            Frame::PathResponse(f) => buf.put_slice(&f.data),
            Frame::ConnectionClose(f) => {
                put_varint(buf, f.error_code)?;
                if let Some(frame_type) = f.frame_type {
                    put_varint(buf, frame_type)?;
                }
                put_varint(buf, f.reason.len() as u64)?;
                buf.put_slice(&f.reason);
            }
            Frame::Raw { payload, .. } => buf.put_slice(payload),
        }
        Ok(())
    }
}
