use std::time::Duration;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device or connect the socket.
    #[error("failed to open {target}: {source}")]
    Connect {
        target: String,
        source: std::io::Error,
    },

    /// Failed to release the device or socket.
    #[error("failed to close {target}: {source}")]
    Close {
        target: String,
        source: std::io::Error,
    },

    /// A read on an open channel failed.
    #[error("transport read error: {0}")]
    Read(std::io::Error),

    /// A write on an open channel failed.
    #[error("transport write error: {0}")]
    Write(std::io::Error),

    /// The operation needs an open channel.
    #[error("transport is not open")]
    NotOpen,

    /// No bytes arrived within the read granularity. The channel is still usable.
    #[error("no data within {0:?}")]
    TimedOut(Duration),

    /// The Bluetooth device address could not be parsed.
    #[error("invalid bluetooth address: {0}")]
    InvalidAddress(String),
}

impl TransportError {
    /// True when the error only means "nothing to read yet".
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::TimedOut(_))
    }
}

impl From<TransportError> for std::io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Read(io) | TransportError::Write(io) => io,
            TransportError::Connect { source, .. } | TransportError::Close { source, .. } => source,
            TransportError::NotOpen => std::io::Error::from(std::io::ErrorKind::NotConnected),
            TransportError::TimedOut(_) => std::io::Error::from(std::io::ErrorKind::TimedOut),
            other => std::io::Error::other(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
