/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the 1-byte length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The checksum byte does not match the frame contents.
    #[error("checksum mismatch (computed {expected:#04x}, frame carried {actual:#04x})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The two bytes after the checksum are not the footer.
    #[error("invalid frame footer {found:02x?} (expected [aa, aa])")]
    InvalidFooter { found: [u8; 2] },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
