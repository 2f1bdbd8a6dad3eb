use std::fmt;
use std::time::Duration;

use crate::bus::Topic;

/// Why a printer reply did not count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The reply carried `false`.
    ExplicitFalse,
    /// The reply carried something other than a boolean.
    NotBoolean,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ExplicitFalse => f.write_str("printer answered false"),
            Rejection::NotBoolean => f.write_str("reply was not a boolean"),
        }
    }
}

/// Outcome of a send-and-wait call that did not succeed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WaitError {
    /// No reply arrived before the deadline.
    #[error("timed out after {after:?} waiting for {topic}")]
    Timeout { topic: Topic, after: Duration },

    /// A reply arrived but did not report success.
    #[error("{topic} was not successful: {reason}")]
    NotSuccessful { topic: Topic, reason: Rejection },
}

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] thermlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] thermlink_frame::FrameError),

    /// A send-and-wait call timed out or was answered negatively.
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// A reply arrived with a payload of the wrong shape.
    #[error("unexpected payload for {topic}: {payload}")]
    UnexpectedPayload { topic: Topic, payload: String },

    /// Every sender of the event bus is gone.
    #[error("event bus closed")]
    BusClosed,

    /// The uplink processor has already stopped and cannot be restarted.
    #[error("uplink processor already stopped")]
    ProcessorStopped,

    /// The uplink thread could not be started.
    #[error("failed to spawn uplink thread: {0}")]
    Spawn(std::io::Error),

    /// A blocking send task panicked or was aborted.
    #[error("send task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Session operations need a Tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// The session is not open.
    #[error("session is not open")]
    NotOpen,
}

impl SessionError {
    /// True for a send-and-wait deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Wait(WaitError::Timeout { .. }))
    }

    /// True for a reply that reported failure or had the wrong type.
    pub fn is_not_successful(&self) -> bool {
        matches!(self, SessionError::Wait(WaitError::NotSuccessful { .. }))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
