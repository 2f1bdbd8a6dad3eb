use std::io::Write;
use std::sync::Arc;

use crate::error::{Result, TransportError};

/// A pull-style duplex byte channel.
///
/// Methods take `&self` so one reader (the uplink processor) and any number of
/// writers can share the same handle. Implementations make a read and a write
/// safe to run at the same time; overlapping writes from several callers must
/// still be serialized by those callers.
pub trait Transport: Send + Sync {
    /// Open the underlying device. Opening an already open transport is a no-op.
    fn open(&self) -> Result<()>;

    /// Release the underlying device. Closing a closed transport is a no-op.
    fn close(&self) -> Result<()>;

    /// Whether the channel is currently open.
    fn is_open(&self) -> bool;

    /// Read available bytes into `buf` (blocking).
    ///
    /// Returns `Ok(0)` once the channel is closed, and
    /// `Err(TransportError::TimedOut)` when no byte arrived within the
    /// transport's read granularity.
    fn read_bytes(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes, returning how many were accepted.
    fn write_bytes(&self, data: &[u8]) -> Result<usize>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;

    /// Write the whole buffer, retrying short writes.
    fn write_all_bytes(&self, data: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < data.len() {
            match self.write_bytes(&data[offset..])? {
                0 => {
                    return Err(TransportError::Write(std::io::Error::from(
                        std::io::ErrorKind::WriteZero,
                    )))
                }
                n => offset += n,
            }
        }
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn open(&self) -> Result<()> {
        (**self).open()
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read_bytes(&self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_bytes(buf)
    }

    fn write_bytes(&self, data: &[u8]) -> Result<usize> {
        (**self).write_bytes(data)
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}

/// Receiver of bytes delivered by a [`PushTransport`].
pub trait InboundSink: Send + Sync {
    /// Called from the transport's receive loop for every inbound chunk.
    fn on_bytes(&self, data: &[u8]);

    /// Called once when the receive loop ends. `error` is `None` on a clean close.
    fn on_closed(&self, error: Option<TransportError>) {
        let _ = error;
    }
}

/// A push-style duplex byte channel: the transport owns the receive loop.
pub trait PushTransport: Send + Sync {
    /// Open the device and start delivering inbound bytes to the current sink.
    fn open(&self) -> Result<()>;

    /// Stop the receive loop and release the device.
    fn close(&self) -> Result<()>;

    /// Whether the channel is currently open.
    fn is_open(&self) -> bool;

    /// Write bytes, returning how many were accepted.
    fn write_bytes(&self, data: &[u8]) -> Result<usize>;

    /// Replace the consumer of inbound bytes. Takes effect for the next chunk.
    fn set_inbound_sink(&self, sink: Arc<dyn InboundSink>);

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

/// `std::io::Write` view over a borrowed [`Transport`].
///
/// Lets frame writers that speak `Write` send through any transport.
pub struct TransportWriter<'a, T: ?Sized> {
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> TransportWriter<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }
}

impl<T: Transport + ?Sized> Write for TransportWriter<'_, T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.transport.write_bytes(buf).map_err(Into::into)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("type", &self.transport_name())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct ChunkyTransport {
        written: Mutex<Vec<u8>>,
        chunk: usize,
    }

    impl Transport for ChunkyTransport {
        fn open(&self) -> Result<()> {
            Ok(())
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }

        fn read_bytes(&self, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }

        fn write_bytes(&self, data: &[u8]) -> Result<usize> {
            let n = data.len().min(self.chunk);
            self.written.lock().unwrap().extend_from_slice(&data[..n]);
            Ok(n)
        }

        fn transport_name(&self) -> &'static str {
            "chunky"
        }
    }

    #[test]
    fn write_all_bytes_retries_short_writes() {
        let transport = ChunkyTransport {
            written: Mutex::new(Vec::new()),
            chunk: 3,
        };
        transport.write_all_bytes(b"abcdefgh").unwrap();
        assert_eq!(transport.written.lock().unwrap().as_slice(), b"abcdefgh");
    }

    #[test]
    fn write_all_bytes_rejects_zero_progress() {
        let transport = ChunkyTransport {
            written: Mutex::new(Vec::new()),
            chunk: 0,
        };
        let err = transport.write_all_bytes(b"x").unwrap_err();
        assert!(matches!(
            err,
            TransportError::Write(e) if e.kind() == std::io::ErrorKind::WriteZero
        ));
    }

    #[test]
    fn transport_writer_maps_to_io_write() {
        let transport = ChunkyTransport {
            written: Mutex::new(Vec::new()),
            chunk: 2,
        };
        let mut writer = TransportWriter::new(&transport);
        writer.write_all(b"hello").unwrap();
        assert_eq!(transport.written.lock().unwrap().as_slice(), b"hello");
    }

    #[test]
    fn timeout_error_maps_to_timed_out_kind() {
        let err: std::io::Error =
            TransportError::TimedOut(std::time::Duration::from_millis(5)).into();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
        assert!(TransportError::TimedOut(std::time::Duration::ZERO).is_timeout());
        assert!(!TransportError::NotOpen.is_timeout());
    }
}
