use std::io::{ErrorKind, Read};

use crate::buffer::PacketBuffer;
use crate::error::{FrameError, Result};
use crate::packet::Packet;

const READ_CHUNK_SIZE: usize = 512;

/// Reads complete packets from any `Read` stream.
///
/// Handles partial reads and resynchronizes past corrupted frames; callers
/// only ever see valid packets.
pub struct PacketReader<T> {
    inner: T,
    buf: PacketBuffer,
}

impl<T: Read> PacketReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: PacketBuffer::new(),
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_packet(&mut self) -> Result<Packet> {
        loop {
            if let Some(packet) = self.buf.next_packet() {
                return Ok(packet);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend(&chunk[..read]);
        }
    }

    /// Frames dropped so far because of a bad checksum or footer.
    pub fn rejected_frames(&self) -> u64 {
        self.buf.rejected_frames()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Iterator for PacketReader<T> {
    type Item = Result<Packet>;

    /// Yields packets until the stream closes cleanly.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_packet() {
            Ok(packet) => Some(Ok(packet)),
            Err(FrameError::ConnectionClosed) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
