//! Printer sessions on top of a byte transport.
//!
//! Data flows one way: the [`UplinkProcessor`] reads the transport and
//! publishes raw packets on the [`EventBus`]; the [`DecoderRegistry`] turns
//! them into typed events; [`wait_on_event`] and [`wait_on_bool_result`]
//! send a request and wait for the typed event that answers it.
//! [`PrinterSession`] wires the three together.

pub mod bus;
pub mod config;
pub mod correlator;
pub mod decoder;
pub mod error;
pub mod processor;
pub mod registry;
pub mod session;

#[cfg(test)]
mod testing;

pub use bus::{
    Event, EventBus, EventPayload, HeartbeatStatus, PrintStatus, Subscription, Topic,
    DEFAULT_BUS_CAPACITY,
};
pub use config::{ProcessorConfig, SessionConfig, DEFAULT_COMMAND_TIMEOUT};
pub use correlator::{wait_on_bool_result, wait_on_event};
pub use decoder::{
    builtin_decoders, AckDecoder, Decoder, DeviceTypeDecoder, HeartbeatDecoder, InfoDecoder,
    PrintStatusDecoder,
};
pub use error::{Rejection, Result, SessionError, WaitError};
pub use processor::{ProcessorState, UplinkProcessor};
pub use registry::DecoderRegistry;
pub use session::PrinterSession;
