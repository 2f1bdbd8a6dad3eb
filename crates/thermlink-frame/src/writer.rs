use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use thermlink_transport::{Transport, TransportWriter};

use crate::codec::{encode_frame, FRAME_OVERHEAD, MAX_PAYLOAD};
use crate::error::{FrameError, Result};
use crate::packet::Packet;

/// Writes complete frames to any `Write` stream.
pub struct PacketWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> PacketWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(FRAME_OVERHEAD + MAX_PAYLOAD),
        }
    }

    /// Write a complete packet (blocking).
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.send(packet.command(), packet.payload())
    }

    /// Encode and send a command with its payload.
    pub fn send(&mut self, command: u8, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(command, payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<'a, T: Transport + ?Sized> PacketWriter<TransportWriter<'a, T>> {
    /// Create a packet writer that sends through a transport.
    pub fn for_transport(transport: &'a T) -> Self {
        Self::new(TransportWriter::new(transport))
    }
}
