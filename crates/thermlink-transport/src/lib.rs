//! Byte transports for thermal label printers.
//!
//! Two shapes of device are supported behind one contract:
//! - pull devices ([`Transport`]) expose blocking reads and writes, e.g. a
//!   serial tty or an RFCOMM tty bound through `/dev/rfcommN`
//! - push devices ([`PushTransport`]) run their own receive loop and hand
//!   inbound bytes to an [`InboundSink`], e.g. a raw Bluetooth RFCOMM socket
//!
//! [`PushAdapter`] turns a push device into a pull device so that everything
//! above this crate only ever deals with [`Transport`].

pub mod adapter;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod rfcomm;
#[cfg(unix)]
pub mod serial;
#[cfg(unix)]
mod sys;

pub use adapter::{AdapterConfig, PushAdapter};
pub use error::{Result, TransportError};
pub use traits::{InboundSink, PushTransport, Transport, TransportWriter};

#[cfg(unix)]
pub use rfcomm::{BdAddr, RfcommConfig, RfcommSocket};
#[cfg(unix)]
pub use serial::{SerialConfig, SerialPort};
