use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::codec::{encode_frame, FRAME_OVERHEAD, MAX_PAYLOAD};
use crate::error::{FrameError, Result};

/// One protocol message: a command code and its payload.
///
/// Equality is structural. The payload never exceeds [`MAX_PAYLOAD`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    command: u8,
    payload: Bytes,
}

impl Packet {
    /// Build a packet, rejecting payloads longer than [`MAX_PAYLOAD`].
    pub fn new(command: u8, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        Ok(Self { command, payload })
    }

    /// Build a packet whose payload is known to fit.
    pub(crate) fn from_wire(command: u8, payload: Bytes) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD);
        Self { command, payload }
    }

    /// Build a packet with a one-byte payload.
    pub fn with_byte(command: u8, value: u8) -> Self {
        Self::from_wire(command, Bytes::copy_from_slice(&[value]))
    }

    /// The command code.
    pub fn command(&self) -> u8 {
        self.command
    }

    /// The payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// First payload byte, if any.
    pub fn first_byte(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// The total wire size of this packet's frame.
    pub fn wire_size(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    /// Append this packet's frame to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        // The length invariant is enforced at construction.
        let _ = encode_frame(self.command, &self.payload, dst);
    }

    /// Encode this packet into a standalone frame.
    pub fn to_frame(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        self.encode_into(&mut dst);
        dst.freeze()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} [", self.command)?;
        for (i, b) in self.payload.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02x}")?;
        }
        f.write_str("]")
    }
}
