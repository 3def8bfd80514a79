//! # Frame Parsing (RFC 9000 Section 12.4)
//!
//! Frame parsing with an iterator-based API. Frame payloads are slices of
//! the decrypted packet (`Bytes::slice`), so no frame data is copied.

#![forbid(unsafe_code)]

use super::types::*;
use crate::error::{Error, Result};
use crate::types::{ConnectionId, MAX_CID_LENGTH};
use crate::varint::VarInt;
use bytes::Bytes;

/// Frame Parser Trait
///
/// Parses frames from a packet payload.
pub trait FrameParser {
    /// Parse a single frame from the front of `buf`
    ///
    /// Returns parsed frame and number of bytes consumed.
    fn parse_frame(&self, buf: &Bytes) -> Result<(Frame, usize)>;

    /// Create an iterator over frames in a payload
    fn iter_frames<'a>(&'a self, payload: &Bytes) -> FrameIterator<'a, Self>
    where
        Self: Sized,
    {
        FrameIterator {
            parser: self,
            buf: payload.clone(),
            offset: 0,
        }
    }

    /// Parse every frame in a payload, failing on the first malformed one.
    fn parse_all(&self, payload: &Bytes) -> Result<Vec<Frame>>
    where
        Self: Sized,
    {
        self.iter_frames(payload).collect()
    }
}

/// Frame Iterator
pub struct FrameIterator<'a, P: FrameParser + ?Sized> {
    parser: &'a P,
    buf: Bytes,
    offset: usize,
}

impl<'a, P: FrameParser + ?Sized> Iterator for FrameIterator<'a, P> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.buf.len() {
            return None;
        }

        match self.parser.parse_frame(&self.buf.slice(self.offset..)) {
            Ok((frame, consumed)) => {
                self.offset += consumed;
                Some(Ok(frame))
            }
            Err(e) => {
                // On error, stop iteration
                self.offset = self.buf.len();
                Some(Err(e))
            }
        }
    }
}

// ============================================================================
// Cursor
// ============================================================================

struct Cursor<'a> {
    buf: &'a Bytes,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a Bytes, pos: usize) -> Self {
        Self { buf, pos }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn varint(&mut self, what: &'static str) -> Result<u64> {
        let (value, consumed) =
            VarInt::decode(&self.buf[self.pos..]).ok_or(Error::FrameEncoding(what))?;
        self.pos += consumed;
        Ok(value.into_inner())
    }

    fn u8(&mut self, what: &'static str) -> Result<u8> {
        let byte = *self.buf.get(self.pos).ok_or(Error::FrameEncoding(what))?;
        self.pos += 1;
        Ok(byte)
    }

    fn bytes(&mut self, len: u64, what: &'static str) -> Result<Bytes> {
        if len > self.remaining() as u64 {
            return Err(Error::FrameEncoding(what));
        }
        let end = self.pos + len as usize;
        let data = self.buf.slice(self.pos..end);
        self.pos = end;
        Ok(data)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        let src = self
            .buf
            .get(self.pos..self.pos + N)
            .ok_or(Error::FrameEncoding(what))?;
        out.copy_from_slice(src);
        self.pos += N;
        Ok(out)
    }

    fn rest(&mut self) -> Bytes {
        let data = self.buf.slice(self.pos..);
        self.pos = self.buf.len();
        data
    }
}

// ============================================================================
// Default Frame Parser Implementation
// ============================================================================

/// Default frame parser implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFrameParser;

impl FrameParser for DefaultFrameParser {
    fn parse_frame(&self, buf: &Bytes) -> Result<(Frame, usize)> {
        let mut cur = Cursor::new(buf, 0);
        let frame_type = cur.varint("truncated frame type")?;

        // PADDING frame special case - consecutive bytes coalesce
        if frame_type == FRAME_TYPE_PADDING {
            let run = buf[cur.pos..].iter().take_while(|&&b| b == 0).count();
            let len = cur.pos + run;
            return Ok((Frame::Padding(len), len));
        }

        let frame = match frame_type {
            FRAME_TYPE_PING => Frame::Ping,

            FRAME_TYPE_ACK | FRAME_TYPE_ACK_ECN => {
                Frame::Ack(Self::parse_ack_frame(&mut cur, frame_type == FRAME_TYPE_ACK_ECN)?)
            }

            FRAME_TYPE_RESET_STREAM => Frame::ResetStream(ResetStreamFrame {
                stream_id: cur.varint("RESET_STREAM stream id")?,
                application_error_code: cur.varint("RESET_STREAM error code")?,
                final_size: cur.varint("RESET_STREAM final size")?,
            }),

            FRAME_TYPE_STOP_SENDING => Frame::StopSending(StopSendingFrame {
                stream_id: cur.varint("STOP_SENDING stream id")?,
                application_error_code: cur.varint("STOP_SENDING error code")?,
            }),

            FRAME_TYPE_CRYPTO => {
                let offset = cur.varint("CRYPTO offset")?;
                let length = cur.varint("CRYPTO length")?;
                if offset.saturating_add(length) > crate::varint::VARINT_MAX {
                    return Err(Error::FrameEncoding("CRYPTO data beyond 2^62"));
                }
                let data = cur.bytes(length, "truncated CRYPTO data")?;
                Frame::Crypto(CryptoFrame { offset, data })
            }

            FRAME_TYPE_NEW_TOKEN => {
                let length = cur.varint("NEW_TOKEN length")?;
                if length == 0 {
                    return Err(Error::FrameEncoding("empty NEW_TOKEN"));
                }
                let token = cur.bytes(length, "truncated NEW_TOKEN")?;
                Frame::NewToken(NewTokenFrame { token })
            }

            // STREAM frames: 0x08-0x0f
            t @ 0x08..=0x0f => Frame::Stream(Self::parse_stream_frame(&mut cur, t)?),

            FRAME_TYPE_MAX_DATA => Frame::MaxData(MaxDataFrame {
                maximum_data: cur.varint("MAX_DATA")?,
            }),

            FRAME_TYPE_MAX_STREAM_DATA => Frame::MaxStreamData(MaxStreamDataFrame {
                stream_id: cur.varint("MAX_STREAM_DATA stream id")?,
                maximum_stream_data: cur.varint("MAX_STREAM_DATA")?,
            }),

            FRAME_TYPE_MAX_STREAMS_BIDI | FRAME_TYPE_MAX_STREAMS_UNI => {
                Frame::MaxStreams(MaxStreamsFrame {
                    bidirectional: frame_type == FRAME_TYPE_MAX_STREAMS_BIDI,
                    maximum_streams: Self::stream_count(&mut cur, "MAX_STREAMS")?,
                })
            }

            FRAME_TYPE_DATA_BLOCKED => Frame::DataBlocked(DataBlockedFrame {
                maximum_data: cur.varint("DATA_BLOCKED")?,
            }),

            FRAME_TYPE_STREAM_DATA_BLOCKED => Frame::StreamDataBlocked(StreamDataBlockedFrame {
                stream_id: cur.varint("STREAM_DATA_BLOCKED stream id")?,
                maximum_stream_data: cur.varint("STREAM_DATA_BLOCKED")?,
            }),

            FRAME_TYPE_STREAMS_BLOCKED_BIDI | FRAME_TYPE_STREAMS_BLOCKED_UNI => {
                Frame::StreamsBlocked(StreamsBlockedFrame {
                    bidirectional: frame_type == FRAME_TYPE_STREAMS_BLOCKED_BIDI,
                    maximum_streams: Self::stream_count(&mut cur, "STREAMS_BLOCKED")?,
                })
            }

            FRAME_TYPE_NEW_CONNECTION_ID => {
                Frame::NewConnectionId(Self::parse_new_connection_id_frame(&mut cur)?)
            }

            FRAME_TYPE_RETIRE_CONNECTION_ID => Frame::RetireConnectionId(RetireConnectionIdFrame {
                sequence_number: cur.varint("RETIRE_CONNECTION_ID")?,
            }),

            FRAME_TYPE_PATH_CHALLENGE => Frame::PathChallenge(PathChallengeFrame {
                data: cur.array("truncated PATH_CHALLENGE")?,
            }),

            FRAME_TYPE_PATH_RESPONSE => Frame::PathResponse(PathResponseFrame {
                data: cur.array("truncated PATH_RESPONSE")?,
            }),

            FRAME_TYPE_CONNECTION_CLOSE_TRANSPORT | FRAME_TYPE_CONNECTION_CLOSE_APPLICATION => {
                let error_code = cur.varint("CONNECTION_CLOSE error code")?;
                let trigger = if frame_type == FRAME_TYPE_CONNECTION_CLOSE_TRANSPORT {
                    Some(cur.varint("CONNECTION_CLOSE frame type")?)
                } else {
                    None
                };
                let reason_len = cur.varint("CONNECTION_CLOSE reason length")?;
                let reason = cur.bytes(reason_len, "truncated CONNECTION_CLOSE reason")?;
                Frame::ConnectionClose(ConnectionCloseFrame {
                    error_code,
                    frame_type: trigger,
                    reason,
                })
            }

            FRAME_TYPE_HANDSHAKE_DONE => Frame::HandshakeDone,

            // RFC 9000 Section 12.4: unknown frame types are a
            // FRAME_ENCODING_ERROR
            _ => return Err(Error::FrameEncoding("unknown frame type")),
        };

        Ok((frame, cur.pos))
    }
}

impl DefaultFrameParser {
    /// Parse STREAM frame (RFC 9000 Section 19.8)
    fn parse_stream_frame(cur: &mut Cursor<'_>, frame_type: u64) -> Result<StreamFrame> {
        let has_offset = (frame_type & STREAM_FRAME_BIT_OFF) != 0;
        let has_length = (frame_type & STREAM_FRAME_BIT_LEN) != 0;
        let fin = (frame_type & STREAM_FRAME_BIT_FIN) != 0;

        let stream_id = cur.varint("STREAM stream id")?;
        let offset = if has_offset {
            cur.varint("STREAM offset")?
        } else {
            0
        };

        let data = if has_length {
            let length = cur.varint("STREAM length")?;
            cur.bytes(length, "truncated STREAM data")?
        } else {
            // No length field - consume rest of buffer
            cur.rest()
        };

        if offset.saturating_add(data.len() as u64) > crate::varint::VARINT_MAX {
            return Err(Error::FrameEncoding("STREAM data beyond 2^62"));
        }

        Ok(StreamFrame {
            stream_id,
            offset,
            has_offset,
            has_length,
            fin,
            data,
        })
    }

    /// Parse ACK frame (RFC 9000 Section 19.3)
    ///
    /// Every range is checked so that no packet number below zero is
    /// acknowledged.
    fn parse_ack_frame(cur: &mut Cursor<'_>, has_ecn: bool) -> Result<AckFrame> {
        let largest_acked = cur.varint("ACK largest acknowledged")?;
        let ack_delay = cur.varint("ACK delay")?;
        let ack_range_count = cur.varint("ACK range count")?;
        let first_ack_range = cur.varint("ACK first range")?;

        // Validate: First ACK Range cannot exceed largest_acked
        let mut smallest = largest_acked
            .checked_sub(first_ack_range)
            .ok_or(Error::FrameEncoding("first ACK range exceeds largest acknowledged"))?;

        // Each range needs at least two bytes
        if ack_range_count > (cur.remaining() / 2) as u64 {
            return Err(Error::FrameEncoding("ACK range count exceeds frame"));
        }

        let mut ack_ranges = tinyvec::TinyVec::new();
        for _ in 0..ack_range_count {
            let gap = cur.varint("ACK gap")?;
            let length = cur.varint("ACK range length")?;

            let range_largest = smallest
                .checked_sub(gap)
                .and_then(|v| v.checked_sub(2))
                .ok_or(Error::FrameEncoding("ACK gap below zero"))?;
            smallest = range_largest
                .checked_sub(length)
                .ok_or(Error::FrameEncoding("ACK range below zero"))?;

            ack_ranges.push(AckRange { gap, length });
        }

        let ecn_counts = if has_ecn {
            Some(EcnCounts {
                ect0_count: cur.varint("ECT0 count")?,
                ect1_count: cur.varint("ECT1 count")?,
                ce_count: cur.varint("ECN-CE count")?,
            })
        } else {
            None
        };

        Ok(AckFrame {
            largest_acked,
            ack_delay,
            first_ack_range,
            ack_ranges,
            ecn_counts,
        })
    }

    /// MAX_STREAMS / STREAMS_BLOCKED counts cannot exceed 2^60
    /// (RFC 9000 Section 19.11).
    fn stream_count(cur: &mut Cursor<'_>, what: &'static str) -> Result<u64> {
        let count = cur.varint(what)?;
        if count > 1 << 60 {
            return Err(Error::FrameEncoding("stream count exceeds 2^60"));
        }
        Ok(count)
    }

    /// Parse NEW_CONNECTION_ID frame (RFC 9000 Section 19.15)
    fn parse_new_connection_id_frame(cur: &mut Cursor<'_>) -> Result<NewConnectionIdFrame> {
        let sequence_number = cur.varint("NEW_CONNECTION_ID sequence")?;
        let retire_prior_to = cur.varint("NEW_CONNECTION_ID retire prior to")?;
        if retire_prior_to > sequence_number {
            return Err(Error::FrameEncoding("retire_prior_to exceeds sequence number"));
        }

        let cid_len = cur.u8("NEW_CONNECTION_ID length")? as usize;
        if cid_len == 0 || cid_len > MAX_CID_LENGTH {
            return Err(Error::FrameEncoding("invalid NEW_CONNECTION_ID length"));
        }
        let cid = cur.bytes(cid_len as u64, "truncated NEW_CONNECTION_ID")?;
        let connection_id =
            ConnectionId::new(cid).ok_or(Error::FrameEncoding("invalid NEW_CONNECTION_ID length"))?;

        Ok(NewConnectionIdFrame {
            sequence_number,
            retire_prior_to,
            connection_id,
            stateless_reset_token: cur.array("truncated stateless reset token")?,
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
