//! Bluetooth RFCOMM socket as a push transport.
//!
//! The socket owns a receive thread that hands every inbound chunk to the
//! installed [`InboundSink`]. Wrap it in a [`crate::PushAdapter`] to read from
//! it like any other [`crate::Transport`].

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::sys;
use crate::traits::{InboundSink, PushTransport};

/// A Bluetooth device address, written most significant byte first
/// (`"AA:BB:CC:DD:EE:FF"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr(pub [u8; 6]);

impl FromStr for BdAddr {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let mut out = [0u8; 6];
        let mut parts = s.split(':');
        for slot in out.iter_mut() {
            let part = parts
                .next()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| TransportError::InvalidAddress(s.to_string()))?;
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| TransportError::InvalidAddress(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(TransportError::InvalidAddress(s.to_string()));
        }
        Ok(Self(out))
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Configuration for an [`RfcommSocket`].
#[derive(Debug, Clone)]
pub struct RfcommConfig {
    /// RFCOMM channel on the printer. Label printers almost always use 1.
    pub channel: u8,
    /// How often the receive thread wakes up to check for shutdown.
    pub poll_interval: Duration,
    /// Size of each receive chunk.
    pub read_chunk_size: usize,
}

impl Default for RfcommConfig {
    fn default() -> Self {
        Self {
            channel: 1,
            poll_interval: Duration::from_millis(100),
            read_chunk_size: 1024,
        }
    }
}

enum Endpoint {
    Bluetooth(BdAddr),
    /// A socket connected elsewhere; consumed by the first `open`.
    Connected(Mutex<Option<OwnedFd>>),
}

struct Link {
    stream: Arc<File>,
    stop: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl Link {
    /// The receive thread is still running.
    fn is_live(&self) -> bool {
        self.pump.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Stop the receive thread and shut the socket down.
    fn tear_down(mut self) -> std::io::Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                warn!("rfcomm receive thread panicked");
            }
        }

        // SAFETY: the descriptor is owned by `self.stream`, which is still alive.
        let rc = unsafe { libc::shutdown(self.stream.as_raw_fd(), libc::SHUT_RDWR) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != ErrorKind::NotConnected {
                return Err(err);
            }
        }
        Ok(())
    }
}

type SharedSink = Arc<RwLock<Option<Arc<dyn InboundSink>>>>;

/// Push transport over a Bluetooth RFCOMM stream socket.
pub struct RfcommSocket {
    endpoint: Endpoint,
    config: RfcommConfig,
    sink: SharedSink,
    link: Mutex<Option<Link>>,
}

impl RfcommSocket {
    /// Describe a printer by address. Nothing is connected until [`PushTransport::open`].
    pub fn new(address: BdAddr) -> Self {
        Self::with_config(address, RfcommConfig::default())
    }

    /// Describe a printer by address with explicit configuration.
    pub fn with_config(address: BdAddr, config: RfcommConfig) -> Self {
        Self {
            endpoint: Endpoint::Bluetooth(address),
            config,
            sink: Arc::new(RwLock::new(None)),
            link: Mutex::new(None),
        }
    }

    /// Use a stream socket that is already connected.
    pub fn from_fd(fd: impl Into<OwnedFd>, config: RfcommConfig) -> Self {
        Self {
            endpoint: Endpoint::Connected(Mutex::new(Some(fd.into()))),
            config,
            sink: Arc::new(RwLock::new(None)),
            link: Mutex::new(None),
        }
    }

    fn target(&self) -> String {
        match &self.endpoint {
            Endpoint::Bluetooth(addr) => format!("{addr}/{}", self.config.channel),
            Endpoint::Connected(_) => "<fd>".to_string(),
        }
    }

    fn connect(&self) -> Result<OwnedFd> {
        match &self.endpoint {
            Endpoint::Bluetooth(addr) => {
                connect_rfcomm(*addr, self.config.channel).map_err(|e| TransportError::Connect {
                    target: self.target(),
                    source: e,
                })
            }
            Endpoint::Connected(slot) => slot
                .lock()
                .ok()
                .and_then(|mut fd| fd.take())
                .ok_or_else(|| TransportError::Connect {
                    target: self.target(),
                    source: std::io::Error::new(
                        ErrorKind::NotFound,
                        "pre-connected socket was already consumed",
                    ),
                }),
        }
    }
}

impl PushTransport for RfcommSocket {
    fn open(&self) -> Result<()> {
        let mut link = self.link.lock().map_err(|_| TransportError::NotOpen)?;
        if link.as_ref().is_some_and(Link::is_live) {
            return Ok(());
        }
        if let Some(stale) = link.take() {
            // The peer hung up; the old socket cannot be reused.
            if let Err(err) = stale.tear_down() {
                debug!(target = %self.target(), error = %err, "stale rfcomm link shutdown failed");
            }
        }

        let stream = Arc::new(File::from(self.connect()?));
        let stop = Arc::new(AtomicBool::new(false));

        let pump = {
            let stream = Arc::clone(&stream);
            let stop = Arc::clone(&stop);
            let sink = Arc::clone(&self.sink);
            let config = self.config.clone();
            std::thread::Builder::new()
                .name("thermlink-rfcomm-rx".to_string())
                .spawn(move || receive_loop(&stream, &stop, &sink, &config))
                .map_err(|e| TransportError::Connect {
                    target: self.target(),
                    source: e,
                })?
        };

        info!(target = %self.target(), "rfcomm link up");
        *link = Some(Link {
            stream,
            stop,
            pump: Some(pump),
        });
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let taken = self
            .link
            .lock()
            .map_err(|_| TransportError::NotOpen)?
            .take();
        let Some(link) = taken else {
            return Ok(());
        };

        link.tear_down().map_err(|source| TransportError::Close {
            target: self.target(),
            source,
        })?;

        info!(target = %self.target(), "rfcomm link down");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.link
            .lock()
            .map(|link| link.as_ref().is_some_and(Link::is_live))
            .unwrap_or(false)
    }

    fn write_bytes(&self, data: &[u8]) -> Result<usize> {
        let stream = self
            .link
            .lock()
            .map_err(|_| TransportError::NotOpen)?
            .as_ref()
            .map(|l| Arc::clone(&l.stream))
            .ok_or(TransportError::NotOpen)?;
        loop {
            match (&*stream).write(data) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Write(err)),
            }
        }
    }

    fn set_inbound_sink(&self, sink: Arc<dyn InboundSink>) {
        if let Ok(mut slot) = self.sink.write() {
            *slot = Some(sink);
        }
    }

    fn transport_name(&self) -> &'static str {
        "rfcomm"
    }
}

impl Drop for RfcommSocket {
    fn drop(&mut self) {
        let _ = PushTransport::close(self);
    }
}

fn receive_loop(stream: &File, stop: &AtomicBool, sink: &SharedSink, config: &RfcommConfig) {
    let mut chunk = vec![0u8; config.read_chunk_size.max(1)];
    let outcome = loop {
        if stop.load(Ordering::SeqCst) {
            break None;
        }
        match sys::wait_readable(stream.as_raw_fd(), config.poll_interval) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(err) => break Some(TransportError::Read(err)),
        }
        match (&*stream).read(&mut chunk) {
            Ok(0) => break None,
            Ok(n) => deliver(sink, &chunk[..n]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => break Some(TransportError::Read(err)),
        }
    };

    debug!(error = ?outcome, "rfcomm receive loop finished");
    if let Some(sink) = current_sink(sink) {
        sink.on_closed(outcome);
    }
}

fn deliver(sink: &SharedSink, data: &[u8]) {
    match current_sink(sink) {
        Some(sink) => sink.on_bytes(data),
        None => debug!(len = data.len(), "no inbound sink; dropping bytes"),
    }
}

fn current_sink(sink: &SharedSink) -> Option<Arc<dyn InboundSink>> {
    sink.read().ok().and_then(|s| s.as_ref().map(Arc::clone))
}

#[cfg(target_os = "linux")]
fn connect_rfcomm(addr: BdAddr, channel: u8) -> std::io::Result<OwnedFd> {
    use std::os::fd::FromRawFd;

    const BTPROTO_RFCOMM: libc::c_int = 3;

    #[repr(C)]
    struct SockaddrRc {
        rc_family: libc::sa_family_t,
        rc_bdaddr: [u8; 6],
        rc_channel: u8,
    }

    // SAFETY: plain socket(2) call; the result is checked before use.
    let raw = unsafe {
        libc::socket(
            libc::AF_BLUETOOTH,
            libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
            BTPROTO_RFCOMM,
        )
    };
    if raw < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: `raw` is a freshly created descriptor that nothing else owns.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    // bdaddr_t is stored least significant byte first.
    let mut bdaddr = addr.0;
    bdaddr.reverse();
    let sockaddr = SockaddrRc {
        rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
        rc_bdaddr: bdaddr,
        rc_channel: channel,
    };

    // SAFETY: `sockaddr` is a valid sockaddr_rc and the length matches its size.
    let rc = unsafe {
        libc::connect(
            fd.as_raw_fd(),
            (&sockaddr as *const SockaddrRc).cast::<libc::sockaddr>(),
            std::mem::size_of::<SockaddrRc>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(fd)
}

#[cfg(not(target_os = "linux"))]
fn connect_rfcomm(_addr: BdAddr, _channel: u8) -> std::io::Result<OwnedFd> {
    Err(std::io::Error::new(
        ErrorKind::Unsupported,
        "RFCOMM sockets are only available on Linux",
    ))
}
