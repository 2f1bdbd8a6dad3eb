//! Background reader that turns the uplink byte stream into packet events.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thermlink_frame::PacketBuffer;
use thermlink_transport::{Transport, TransportError};
use tracing::{debug, info, trace, warn};

use crate::bus::{Event, EventBus, EventPayload, Topic};
use crate::config::ProcessorConfig;
use crate::error::{Result, SessionError};

/// Lifecycle of an [`UplinkProcessor`].
///
/// `Idle -> Running -> Stopping -> Stopped`. A stopped processor cannot be
/// restarted; build a new one instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ProcessorState>,
    changed: Condvar,
    cancel: AtomicBool,
    error: Mutex<Option<TransportError>>,
    published: AtomicU64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ProcessorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, error: Option<TransportError>) {
        *self.error.lock().unwrap_or_else(PoisonError::into_inner) = error;
        *self.state() = ProcessorState::Stopped;
        self.changed.notify_all();
    }
}

/// Reads the transport on a dedicated thread and publishes every decoded
/// packet on [`Topic::UplinkedPacket`].
///
/// The loop ends when [`stop_processing`](Self::stop_processing) is called,
/// when the transport reports end of stream, or when a read fails. In every
/// case a [`Topic::UplinkStopped`] event is published on the way out.
pub struct UplinkProcessor {
    transport: Arc<dyn Transport>,
    bus: EventBus,
    config: ProcessorConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl UplinkProcessor {
    pub fn new(transport: Arc<dyn Transport>, bus: EventBus) -> Self {
        Self::with_config(transport, bus, ProcessorConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn Transport>,
        bus: EventBus,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            transport,
            bus,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(ProcessorState::Idle),
                changed: Condvar::new(),
                cancel: AtomicBool::new(false),
                error: Mutex::new(None),
                published: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the reader thread.
    ///
    /// Starting a running processor is a no-op. Starting a stopping or
    /// stopped processor fails with [`SessionError::ProcessorStopped`].
    pub fn start_processing(&self) -> Result<()> {
        let mut state = self.shared.state();
        match *state {
            ProcessorState::Running => return Ok(()),
            ProcessorState::Stopping | ProcessorState::Stopped => {
                return Err(SessionError::ProcessorStopped)
            }
            ProcessorState::Idle => {}
        }

        let worker = UplinkWorker {
            transport: Arc::clone(&self.transport),
            bus: self.bus.clone(),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
        };

        let handle = thread::Builder::new()
            .name(format!("thermlink-uplink-{}", self.transport.transport_name()))
            .spawn(move || worker.run())
            .map_err(|err| {
                *state = ProcessorState::Stopped;
                SessionError::Spawn(err)
            })?;

        *state = ProcessorState::Running;
        drop(state);

        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!(transport = self.transport.transport_name(), "uplink processor started");
        Ok(())
    }

    /// Ask the reader thread to exit and wait for it.
    ///
    /// Idempotent. Safe to call from the reader thread itself, in which case
    /// it only requests the stop. An idle processor goes straight to
    /// [`ProcessorState::Stopped`].
    pub fn stop_processing(&self) {
        {
            let mut state = self.shared.state();
            match *state {
                ProcessorState::Idle => {
                    *state = ProcessorState::Stopped;
                    self.shared.changed.notify_all();
                    return;
                }
                ProcessorState::Running => *state = ProcessorState::Stopping,
                ProcessorState::Stopping | ProcessorState::Stopped => {}
            }
        }
        self.shared.cancel.store(true, Ordering::SeqCst);

        let handle = {
            let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            match worker.as_ref() {
                Some(handle) if handle.thread().id() == thread::current().id() => return,
                _ => worker.take(),
            }
        };

        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    warn!("uplink thread panicked");
                    self.shared.finish(None);
                }
            }
            None => {
                self.wait_stopped(None);
            }
        }
    }

    /// Block until the processor reaches [`ProcessorState::Stopped`].
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_stopped(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.shared.state();
        while *state != ProcessorState::Stopped {
            match deadline {
                None => {
                    state = self
                        .shared
                        .changed
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    state = self
                        .shared
                        .changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        true
    }

    pub fn state(&self) -> ProcessorState {
        *self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessorState::Running
    }

    /// Packets published since start.
    pub fn packets_published(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    /// Take the read error that ended the loop, if any.
    pub fn take_error(&self) -> Option<TransportError> {
        self.shared
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for UplinkProcessor {
    fn drop(&mut self) {
        self.stop_processing();
    }
}

struct UplinkWorker {
    transport: Arc<dyn Transport>,
    bus: EventBus,
    config: ProcessorConfig,
    shared: Arc<Shared>,
}

impl UplinkWorker {
    fn run(self) {
        let mut buffer = PacketBuffer::with_capacity(self.config.initial_buffer_capacity);
        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];

        let error = loop {
            if self.shared.cancel.load(Ordering::SeqCst) {
                debug!("uplink processor cancelled");
                break None;
            }

            match self.transport.read_bytes(&mut chunk) {
                Ok(0) => {
                    info!(transport = self.transport.transport_name(), "uplink closed");
                    break None;
                }
                Ok(read) => {
                    trace!(read, "uplink bytes");
                    for packet in buffer.push(&chunk[..read]) {
                        self.shared.published.fetch_add(1, Ordering::Relaxed);
                        self.bus.publish(Event::new(
                            Topic::UplinkedPacket,
                            EventPayload::Packet(packet),
                        ));
                    }
                }
                Err(err) if err.is_timeout() => continue,
                Err(TransportError::NotOpen) => {
                    info!(
                        transport = self.transport.transport_name(),
                        "transport closed under uplink"
                    );
                    break None;
                }
                Err(err) => {
                    warn!(error = %err, "uplink read failed");
                    break Some(err);
                }
            }
        };

        {
            let mut state = self.shared.state();
            if *state == ProcessorState::Running {
                *state = ProcessorState::Stopping;
            }
        }
        if !buffer.is_empty() {
            debug!(pending = buffer.len(), "discarding partial frame");
        }

        self.bus.publish(Event::new(
            Topic::UplinkStopped,
            EventPayload::Stopped {
                error: error.as_ref().map(ToString::to_string),
            },
        ));
        self.shared.finish(error);
    }
}
