//! # CRYPTO Stream Reassembly (RFC 9000 Section 19.6)
//!
//! CRYPTO frames carry an offset into a per-epoch byte stream and may arrive
//! out of order or duplicated. [`CryptoStream`] releases bytes only once they
//! are contiguous with everything released before.

#![forbid(unsafe_code)]

use crate::error::{Error, Result, TransportError};
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct CryptoStream {
    /// Next offset to release
    delivered: u64,
    /// Data beyond `delivered`, keyed by offset
    pending: BTreeMap<u64, Bytes>,
    pending_bytes: usize,
}

impl CryptoStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset up to which data has been released.
    pub fn delivered_offset(&self) -> u64 {
        self.delivered
    }

    /// Bytes held while waiting for a gap to fill.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Accept `data` at `offset` and return the bytes that became contiguous.
    ///
    /// The returned buffer is empty for duplicates and for data beyond a gap.
    /// Holding more than `limit` out-of-order bytes is a
    /// CRYPTO_BUFFER_EXCEEDED error.
    pub fn insert(&mut self, offset: u64, data: Bytes, limit: usize) -> Result<Bytes> {
        let end = offset + data.len() as u64;
        if end <= self.delivered {
            return Ok(Bytes::new());
        }

        let (offset, data) = if offset < self.delivered {
            let skip = (self.delivered - offset) as usize;
            (self.delivered, data.slice(skip..))
        } else {
            (offset, data)
        };

        if offset > self.delivered {
            self.hold(offset, data, limit)?;
            return Ok(Bytes::new());
        }

        let mut out = BytesMut::from(&data[..]);
        self.delivered = end;

        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() > self.delivered {
                break;
            }
            let start = *entry.key();
            let chunk = entry.remove();
            self.pending_bytes -= chunk.len();

            let chunk_end = start + chunk.len() as u64;
            if chunk_end > self.delivered {
                let skip = (self.delivered - start) as usize;
                out.extend_from_slice(&chunk[skip..]);
                self.delivered = chunk_end;
            }
        }

        Ok(out.freeze())
    }

    fn hold(&mut self, offset: u64, data: Bytes, limit: usize) -> Result<()> {
        if let Some(existing) = self.pending.get(&offset) {
            if existing.len() >= data.len() {
                return Ok(());
            }
            self.pending_bytes -= existing.len();
        }
        self.pending_bytes += data.len();
        self.pending.insert(offset, data);

        if self.pending_bytes > limit {
            return Err(Error::Transport(TransportError::CryptoBufferExceeded));
        }
        Ok(())
    }
}
