use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::codec::{scan_and_decode, Scan};
use crate::packet::Packet;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Accumulates raw bytes and yields decoded packets in stream order.
///
/// Wraps [`scan_and_decode`]: after every scan the consumed prefix is dropped,
/// and scanning stops as soon as a scan consumes nothing.
#[derive(Debug)]
pub struct PacketBuffer {
    buf: BytesMut,
    rejected: u64,
    skipped: u64,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            rejected: 0,
            skipped: 0,
        }
    }

    /// Append freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Decode the next packet, skipping noise and corrupted frames.
    ///
    /// Returns `None` once the remaining bytes cannot be decoded without more input.
    pub fn next_packet(&mut self) -> Option<Packet> {
        loop {
            let scan = scan_and_decode(&self.buf);
            let consumed = scan.consumed();
            match scan {
                Scan::Decoded { packet, .. } => {
                    self.buf.advance(consumed);
                    return Some(packet);
                }
                Scan::Rejected { error, .. } => {
                    self.rejected += 1;
                    debug!(%error, consumed, "dropping corrupted frame");
                }
                Scan::Skipped { .. } => {
                    self.skipped += consumed as u64;
                    debug!(consumed, "skipping bytes outside any frame");
                }
                Scan::NeedMore => return None,
            }
            self.buf.advance(consumed);
        }
    }

    /// Append `data` and decode every packet that is now complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<Packet> {
        self.extend(data);
        std::iter::from_fn(|| self.next_packet()).collect()
    }

    /// Bytes waiting for the rest of their frame.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Frames dropped for a bad checksum or footer.
    pub fn rejected_frames(&self) -> u64 {
        self.rejected
    }

    /// Noise bytes dropped outside any frame.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Drop all pending bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}
