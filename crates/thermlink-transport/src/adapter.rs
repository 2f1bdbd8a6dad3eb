use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::traits::{InboundSink, PushTransport, Transport};

const INITIAL_QUEUE_CAPACITY: usize = 4 * 1024;

/// Configuration for a [`PushAdapter`].
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Longest a single `read_bytes` call waits for delivered bytes.
    pub read_granularity: Duration,
    /// Inbound bytes held before new chunks are discarded.
    pub max_queued: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            read_granularity: Duration::from_millis(100),
            max_queued: 64 * 1024,
        }
    }
}

#[derive(Default)]
struct QueueState {
    buf: BytesMut,
    opened: bool,
    closed: bool,
    error: Option<TransportError>,
    discarded: usize,
}

struct InboundQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    max_queued: usize,
}

impl InboundQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A poisoned queue still holds consistent bytes; keep serving them.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl InboundSink for InboundQueue {
    fn on_bytes(&self, data: &[u8]) {
        let mut state = self.lock();
        if state.buf.len() + data.len() > self.max_queued {
            state.discarded += data.len();
            warn!(
                len = data.len(),
                discarded = state.discarded,
                "inbound queue full; discarding chunk"
            );
            return;
        }
        state.buf.extend_from_slice(data);
        drop(state);
        self.ready.notify_all();
    }

    fn on_closed(&self, error: Option<TransportError>) {
        let mut state = self.lock();
        state.closed = true;
        if error.is_some() {
            state.error = error;
        }
        drop(state);
        self.ready.notify_all();
    }
}

/// Presents a [`PushTransport`] as a pull [`Transport`].
///
/// Bytes delivered to the sink are queued; `read_bytes` drains the queue and
/// blocks (up to the read granularity) while it is empty.
pub struct PushAdapter<P> {
    inner: P,
    queue: Arc<InboundQueue>,
    config: AdapterConfig,
}

impl<P: PushTransport> PushAdapter<P> {
    /// Wrap a push transport with default configuration.
    pub fn new(inner: P) -> Self {
        Self::with_config(inner, AdapterConfig::default())
    }

    /// Wrap a push transport with explicit configuration.
    pub fn with_config(inner: P, config: AdapterConfig) -> Self {
        let queue = Arc::new(InboundQueue {
            state: Mutex::new(QueueState {
                buf: BytesMut::with_capacity(INITIAL_QUEUE_CAPACITY),
                ..QueueState::default()
            }),
            ready: Condvar::new(),
            max_queued: config.max_queued,
        });
        Self {
            inner,
            queue,
            config,
        }
    }

    /// Borrow the wrapped push transport.
    pub fn get_ref(&self) -> &P {
        &self.inner
    }

    /// Bytes discarded because the queue was full.
    pub fn discarded(&self) -> usize {
        self.queue.lock().discarded
    }
}

impl<P: PushTransport> Transport for PushAdapter<P> {
    fn open(&self) -> Result<()> {
        if self.inner.is_open() {
            return Ok(());
        }
        {
            let mut state = self.queue.lock();
            state.buf.clear();
            state.closed = false;
            state.error = None;
            state.opened = true;
        }
        let sink: Arc<dyn InboundSink> = Arc::clone(&self.queue) as Arc<dyn InboundSink>;
        self.inner.set_inbound_sink(sink);
        if let Err(err) = self.inner.open() {
            self.queue.lock().opened = false;
            return Err(err);
        }
        debug!(transport = self.inner.transport_name(), "push adapter attached");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let result = self.inner.close();
        self.queue.on_closed(None);
        result
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn read_bytes(&self, buf: &mut [u8]) -> Result<usize> {
        let granularity = self.config.read_granularity;
        let state = self.queue.lock();
        if !state.opened {
            return Err(TransportError::NotOpen);
        }

        let (mut state, _) = self
            .queue
            .ready
            .wait_timeout_while(state, granularity, |s| s.buf.is_empty() && !s.closed)
            .unwrap_or_else(|e| e.into_inner());

        if !state.buf.is_empty() {
            let n = state.buf.len().min(buf.len());
            buf[..n].copy_from_slice(&state.buf[..n]);
            state.buf.advance(n);
            return Ok(n);
        }
        if let Some(err) = state.error.take() {
            return Err(err);
        }
        if state.closed {
            return Ok(0);
        }
        Err(TransportError::TimedOut(granularity))
    }

    fn write_bytes(&self, data: &[u8]) -> Result<usize> {
        self.inner.write_bytes(data)
    }

    fn transport_name(&self) -> &'static str {
        self.inner.transport_name()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::RwLock;

    use super::*;

    /// Push transport whose "receive loop" is driven by the test.
    #[derive(Default)]
    struct ScriptedPush {
        sink: RwLock<Option<Arc<dyn InboundSink>>>,
        open: AtomicBool,
        written: Mutex<Vec<u8>>,
    }

    impl ScriptedPush {
        fn deliver(&self, data: &[u8]) {
            if let Some(sink) = self.sink.read().unwrap().as_ref() {
                sink.on_bytes(data);
            }
        }

        fn hang_up(&self, error: Option<TransportError>) {
            if let Some(sink) = self.sink.read().unwrap().as_ref() {
                sink.on_closed(error);
            }
        }
    }

    impl PushTransport for ScriptedPush {
        fn open(&self) -> Result<()> {
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) -> Result<()> {
            self.open.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        fn write_bytes(&self, data: &[u8]) -> Result<usize> {
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn set_inbound_sink(&self, sink: Arc<dyn InboundSink>) {
            *self.sink.write().unwrap() = Some(sink);
        }

        fn transport_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn adapter() -> PushAdapter<ScriptedPush> {
        PushAdapter::with_config(
            ScriptedPush::default(),
            AdapterConfig {
                read_granularity: Duration::from_millis(20),
                max_queued: 8,
            },
        )
    }

    #[test]
    fn read_before_open_is_rejected() {
        let adapter = adapter();
        assert!(matches!(
            adapter.read_bytes(&mut [0u8; 4]),
            Err(TransportError::NotOpen)
        ));
    }

    #[test]
    fn delivered_bytes_are_drained_in_order() {
        let adapter = adapter();
        adapter.open().unwrap();
        adapter.get_ref().deliver(b"abc");
        adapter.get_ref().deliver(b"de");

        let mut buf = [0u8; 4];
        let n = adapter.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"abcd");
        let n = adapter.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"e");
    }

    #[test]
    fn empty_queue_times_out() {
        let adapter = adapter();
        adapter.open().unwrap();
        let err = adapter.read_bytes(&mut [0u8; 4]).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn read_wakes_when_bytes_arrive() {
        let adapter = Arc::new(PushAdapter::with_config(
            ScriptedPush::default(),
            AdapterConfig {
                read_granularity: Duration::from_secs(5),
                max_queued: 64,
            },
        ));
        adapter.open().unwrap();

        let feeder = {
            let adapter = Arc::clone(&adapter);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                adapter.get_ref().deliver(b"late");
            })
        };

        let mut buf = [0u8; 8];
        let n = adapter.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"late");
        feeder.join().unwrap();
    }

    #[test]
    fn hang_up_drains_then_reports_eof() {
        let adapter = adapter();
        adapter.open().unwrap();
        adapter.get_ref().deliver(b"xy");
        adapter.get_ref().hang_up(None);

        let mut buf = [0u8; 4];
        assert_eq!(adapter.read_bytes(&mut buf).unwrap(), 2);
        assert_eq!(adapter.read_bytes(&mut buf).unwrap(), 0);
    }

    #[test]
    fn receive_error_surfaces_once() {
        let adapter = adapter();
        adapter.open().unwrap();
        adapter.get_ref().hang_up(Some(TransportError::Read(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        ))));

        let mut buf = [0u8; 4];
        assert!(matches!(adapter.read_bytes(&mut buf), Err(TransportError::Read(_))));
        assert_eq!(adapter.read_bytes(&mut buf).unwrap(), 0);
    }

    #[test]
    fn overflow_discards_new_chunks() {
        let adapter = adapter();
        adapter.open().unwrap();
        adapter.get_ref().deliver(b"12345678");
        adapter.get_ref().deliver(b"9");
        assert_eq!(adapter.discarded(), 1);

        let mut buf = [0u8; 16];
        let n = adapter.read_bytes(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"12345678");
    }

    #[test]
    fn writes_pass_through() {
        let adapter = adapter();
        adapter.open().unwrap();
        adapter.write_all_bytes(b"cmd").unwrap();
        assert_eq!(adapter.get_ref().written.lock().unwrap().as_slice(), b"cmd");
    }

    #[test]
    fn close_wakes_reader_with_eof() {
        let adapter = adapter();
        adapter.open().unwrap();
        adapter.close().unwrap();
        assert!(!adapter.is_open());
        assert_eq!(adapter.read_bytes(&mut [0u8; 4]).unwrap(), 0);
    }
}
