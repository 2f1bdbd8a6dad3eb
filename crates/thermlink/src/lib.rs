//! Driver core for thermal label printers.
//!
//! thermlink talks to label printers over a serial tty or a Bluetooth RFCOMM
//! link: it frames commands, reassembles the printer's reply stream, decodes
//! replies into typed events and pairs each command with its answer.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte transports (serial fd, RFCOMM socket, push adapter)
//! - [`frame`]: packet framing, stream reassembly and the command table
//! - [`session`]: event bus, uplink processor, decoders and printer sessions
//!   (behind the `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use thermlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use thermlink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use thermlink_session::*;
}
