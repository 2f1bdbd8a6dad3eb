use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thermlink_frame::{encode, PacketBuffer};
use thermlink_transport::{Result, Transport, TransportError};

const POLL: Duration = Duration::from_millis(5);

pub(crate) enum Step {
    Data(Vec<u8>),
    Timeout,
    Eof,
    Fail,
}

type Responder = Box<dyn Fn(u8, &[u8]) -> Option<(u8, Vec<u8>)> + Send + Sync>;

/// Scripted in-memory transport; optionally answers written frames.
pub(crate) struct MockTransport {
    steps: Mutex<VecDeque<Step>>,
    written: Mutex<Vec<u8>>,
    open: AtomicBool,
    responder: Option<Responder>,
}

impl MockTransport {
    pub(crate) fn scripted(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            written: Mutex::new(Vec::new()),
            open: AtomicBool::new(false),
            responder: None,
        })
    }

    pub(crate) fn idle() -> Arc<Self> {
        Self::scripted([])
    }

    /// A printer that answers each request with `respond(command, payload)`.
    pub(crate) fn printer(
        respond: impl Fn(u8, &[u8]) -> Option<(u8, Vec<u8>)> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            written: Mutex::new(Vec::new()),
            open: AtomicBool::new(false),
            responder: Some(Box::new(respond)),
        })
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
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

    fn read_bytes(&self, buf: &mut [u8]) -> Result<usize> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    self.steps.lock().unwrap().push_front(Step::Data(rest));
                }
                Ok(n)
            }
            Some(Step::Eof) => Ok(0),
            Some(Step::Fail) => Err(TransportError::Read(std::io::Error::other("link lost"))),
            Some(Step::Timeout) | None => {
                std::thread::sleep(POLL);
                Err(TransportError::TimedOut(POLL))
            }
        }
    }

    fn write_bytes(&self, data: &[u8]) -> Result<usize> {
        self.written.lock().unwrap().extend_from_slice(data);
        if let Some(respond) = &self.responder {
            let mut buffer = PacketBuffer::new();
            for packet in buffer.push(data) {
                if let Some((command, payload)) = respond(packet.command(), packet.payload()) {
                    let frame = encode(command, &payload).unwrap().to_vec();
                    self.steps.lock().unwrap().push_back(Step::Data(frame));
                }
            }
        }
        Ok(data.len())
    }

    fn transport_name(&self) -> &'static str {
        "mock"
    }
}
