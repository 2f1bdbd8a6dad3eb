//! Packet framing for thermal label printers.
//!
//! Every packet travels in a frame of:
//! - a 2-byte header `0x55 0x55`
//! - a 1-byte command code and a 1-byte payload length
//! - the payload (at most 255 bytes)
//! - a 1-byte XOR checksum over command, length and payload
//! - a 2-byte footer `0xAA 0xAA`
//!
//! Decoding is incremental and resynchronizing: garbage and corrupted frames
//! are skipped, partial frames wait for more bytes.

pub mod buffer;
pub mod codec;
pub mod command;
pub mod error;
pub mod packet;
pub mod reader;
pub mod writer;

pub use buffer::PacketBuffer;
pub use codec::{
    checksum, encode, encode_frame, scan_and_decode, Scan, FOOTER, FRAME_OVERHEAD, HEADER,
    MAX_PAYLOAD,
};
pub use command::{command_name, InfoKey};
pub use error::{FrameError, Result};
pub use packet::Packet;
pub use reader::PacketReader;
pub use writer::PacketWriter;
