use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::sys;
use crate::traits::Transport;

/// Configuration for a [`SerialPort`].
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Line speed applied when the device is a tty. `None` leaves the tty untouched.
    pub baud_rate: Option<u32>,
    /// Longest a single `read_bytes` call blocks before reporting `TimedOut`.
    pub read_granularity: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: Some(115_200),
            read_granularity: Duration::from_millis(100),
        }
    }
}

/// Pull transport over a file descriptor: a serial tty, `/dev/rfcommN`, or any
/// already connected stream socket.
pub struct SerialPort {
    path: Option<PathBuf>,
    config: SerialConfig,
    handle: RwLock<Option<Arc<File>>>,
}

impl SerialPort {
    /// Describe a device path. Nothing is opened until [`Transport::open`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_config(path, SerialConfig::default())
    }

    /// Describe a device path with explicit configuration.
    pub fn with_config(path: impl AsRef<Path>, config: SerialConfig) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            config,
            handle: RwLock::new(None),
        }
    }

    /// Wrap a descriptor that is already open. Such a port cannot be reopened
    /// after [`Transport::close`].
    pub fn from_fd(fd: impl Into<OwnedFd>, config: SerialConfig) -> Self {
        let file = File::from(fd.into());
        Self {
            path: None,
            config,
            handle: RwLock::new(Some(Arc::new(file))),
        }
    }

    /// The device path, if this port was created from one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current configuration.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn target(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<fd>".to_string())
    }

    fn current(&self) -> Result<Arc<File>> {
        let guard = self.handle.read().map_err(|_| TransportError::NotOpen)?;
        guard.as_ref().map(Arc::clone).ok_or(TransportError::NotOpen)
    }
}

impl Transport for SerialPort {
    fn open(&self) -> Result<()> {
        let mut guard = self.handle.write().map_err(|_| TransportError::NotOpen)?;
        if guard.is_some() {
            return Ok(());
        }

        let path = self.path.as_ref().ok_or_else(|| TransportError::Connect {
            target: self.target(),
            source: std::io::Error::new(
                ErrorKind::NotFound,
                "descriptor-backed port cannot be reopened",
            ),
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|e| TransportError::Connect {
                target: self.target(),
                source: e,
            })?;

        let fd = file.as_raw_fd();
        if let Some(baud) = self.config.baud_rate {
            if sys::is_tty(fd) {
                sys::configure_raw_tty(fd, baud).map_err(|e| TransportError::Connect {
                    target: self.target(),
                    source: e,
                })?;
                debug!(?path, baud, "configured tty");
            }
        }

        info!(?path, "opened serial device");
        *guard = Some(Arc::new(file));
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.handle.write().map_err(|_| TransportError::NotOpen)?;
        if guard.take().is_some() {
            // In-flight reads keep their own handle until their poll window ends.
            info!(target = %self.target(), "closed serial device");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.read().map(|g| g.is_some()).unwrap_or(false)
    }

    fn read_bytes(&self, buf: &mut [u8]) -> Result<usize> {
        let file = self.current()?;
        let granularity = self.config.read_granularity;

        if !sys::wait_readable(file.as_raw_fd(), granularity).map_err(TransportError::Read)? {
            return Err(TransportError::TimedOut(granularity));
        }

        loop {
            match (&*file).read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Err(TransportError::TimedOut(granularity))
                }
                Err(err) => return Err(TransportError::Read(err)),
            }
        }
    }

    fn write_bytes(&self, data: &[u8]) -> Result<usize> {
        let file = self.current()?;
        loop {
            match (&*file).write(data) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Write(err)),
            }
        }
    }

    fn transport_name(&self) -> &'static str {
        "serial"
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("target", &self.target())
            .field("open", &self.is_open())
            .finish()
    }
}
