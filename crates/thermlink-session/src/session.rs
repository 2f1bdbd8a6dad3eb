use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thermlink_frame::{command, InfoKey, Packet, PacketWriter};
use thermlink_transport::Transport;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, EventPayload, HeartbeatStatus, PrintStatus, Topic};
use crate::config::SessionConfig;
use crate::correlator::{wait_on_bool_result, wait_on_event};
use crate::error::{Result, SessionError};
use crate::processor::{ProcessorState, UplinkProcessor};
use crate::registry::DecoderRegistry;

type SendFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// A connection to one printer.
///
/// Owns the transport, the uplink processor reading from it and the decoder
/// dispatch task. Command methods send one request and wait for its typed
/// reply. Concurrent commands are the caller's to serialize.
pub struct PrinterSession {
    transport: Arc<dyn Transport>,
    bus: EventBus,
    config: SessionConfig,
    registry: Arc<DecoderRegistry>,
    processor: Option<UplinkProcessor>,
    dispatch: Option<(CancellationToken, JoinHandle<()>)>,
}

impl PrinterSession {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let bus = EventBus::with_capacity(config.bus_capacity);
        let registry = Arc::new(DecoderRegistry::with_builtin(bus.clone()));
        Self::with_registry(transport, config, registry)
    }

    /// Use a custom decoder registry. The session publishes on the registry's bus.
    pub fn with_registry(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        registry: Arc<DecoderRegistry>,
    ) -> Self {
        Self {
            transport,
            bus: registry.bus().clone(),
            config,
            registry,
            processor: None,
            dispatch: None,
        }
    }

    /// Open the transport and start reading and decoding.
    ///
    /// Must be called from within a Tokio runtime. A session whose uplink
    /// already stopped is closed and opened again.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            if self.processor_state() != Some(ProcessorState::Stopped) {
                return Ok(());
            }
            self.close()?;
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| SessionError::NoRuntime(err.to_string()))?;

        self.transport.open()?;

        let cancel = CancellationToken::new();
        let dispatch = Arc::clone(&self.registry).spawn_on(&runtime, cancel.clone());

        let processor = UplinkProcessor::with_config(
            Arc::clone(&self.transport),
            self.bus.clone(),
            self.config.processor.clone(),
        );
        if let Err(err) = processor.start_processing() {
            cancel.cancel();
            let _ = self.transport.close();
            return Err(err);
        }

        self.processor = Some(processor);
        self.dispatch = Some((cancel, dispatch));
        info!(transport = self.transport.transport_name(), "printer session open");
        Ok(())
    }

    /// Stop reading, stop decoding and close the transport. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        let was_open = self.processor.is_some();
        if let Some(processor) = self.processor.take() {
            processor.stop_processing();
            if let Some(err) = processor.take_error() {
                debug!(error = %err, "uplink had stopped on a read error");
            }
        }
        if let Some((cancel, task)) = self.dispatch.take() {
            cancel.cancel();
            drop(task);
        }
        // Also tears down a link the printer already dropped.
        self.transport.close()?;
        if was_open {
            info!(transport = self.transport.transport_name(), "printer session closed");
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.processor.is_some()
    }

    /// State of the uplink processor, `None` while the session is closed.
    pub fn processor_state(&self) -> Option<ProcessorState> {
        self.processor.as_ref().map(UplinkProcessor::state)
    }

    /// Event bus the session publishes on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Send a packet without waiting for a reply.
    pub fn send(&self, packet: &Packet) -> Result<()> {
        if !self.is_open() {
            return Err(SessionError::NotOpen);
        }
        PacketWriter::for_transport(&*self.transport).write_packet(packet)?;
        Ok(())
    }

    /// Send `packet` and return the payload of the next event on `topic`.
    pub async fn request(
        &self,
        packet: Packet,
        topic: Topic,
        timeout: Option<Duration>,
    ) -> Result<EventPayload> {
        let timeout = timeout.unwrap_or(self.config.command_timeout);
        wait_on_event(&self.bus, topic, timeout, self.send_action(packet)).await
    }

    /// Send `packet` and require a `true` reply on `topic`.
    pub async fn request_bool(
        &self,
        packet: Packet,
        topic: Topic,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let timeout = timeout.unwrap_or(self.config.command_timeout);
        wait_on_bool_result(&self.bus, topic, timeout, self.send_action(packet)).await
    }

    fn send_action(&self, packet: Packet) -> impl FnOnce(CancellationToken) -> SendFuture {
        let transport = Arc::clone(&self.transport);
        let open = self.is_open();
        move |cancel: CancellationToken| -> SendFuture {
            Box::pin(async move {
                if !open {
                    return Err(SessionError::NotOpen);
                }
                tokio::task::spawn_blocking(move || -> Result<()> {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    PacketWriter::for_transport(&*transport).write_packet(&packet)?;
                    Ok(())
                })
                .await?
            })
        }
    }

    pub async fn start_print(&self) -> Result<()> {
        self.request_bool(command::start_print(), Topic::PrintStarted, None)
            .await
    }

    pub async fn end_print(&self) -> Result<()> {
        self.request_bool(command::end_print(), Topic::PrintEnded, None)
            .await
    }

    pub async fn start_page_print(&self) -> Result<()> {
        self.request_bool(command::start_page_print(), Topic::PageStarted, None)
            .await
    }

    pub async fn end_page_print(&self) -> Result<()> {
        self.request_bool(command::end_page_print(), Topic::PageEnded, None)
            .await
    }

    pub async fn set_label_density(&self, density: u8) -> Result<()> {
        self.request_bool(
            command::set_label_density(density),
            Topic::DensitySet,
            None,
        )
        .await
    }

    pub async fn set_label_type(&self, label_type: u8) -> Result<()> {
        self.request_bool(
            command::set_label_type(label_type),
            Topic::LabelTypeSet,
            None,
        )
        .await
    }

    /// Set the page size in dots.
    pub async fn set_dimension(&self, height: u16, width: u16) -> Result<()> {
        self.request_bool(
            command::set_dimension(height, width),
            Topic::DimensionSet,
            None,
        )
        .await
    }

    pub async fn set_quantity(&self, copies: u16) -> Result<()> {
        self.request_bool(command::set_quantity(copies), Topic::QuantitySet, None)
            .await
    }

    /// Discard the printer's buffered job.
    pub async fn clear_buffer(&self) -> Result<()> {
        self.request_bool(command::allow_print_clear(), Topic::PrintCleared, None)
            .await
    }

    /// Model number of the printer.
    pub async fn device_type(&self) -> Result<u16> {
        let topic = Topic::DeviceType;
        let payload = self
            .request(command::get_info(InfoKey::DeviceType), topic, None)
            .await?;
        payload
            .as_number()
            .and_then(|value| u16::try_from(value).ok())
            .ok_or_else(|| unexpected(topic, &payload))
    }

    /// Read one device property. Numeric keys come back as numbers, the
    /// serial number as bytes.
    pub async fn info(&self, key: InfoKey) -> Result<EventPayload> {
        if key == InfoKey::DeviceType {
            return self.device_type().await.map(|t| EventPayload::Number(i64::from(t)));
        }
        self.request(command::get_info(key), Topic::Info(key), None)
            .await
    }

    /// Serial number as raw bytes.
    pub async fn serial(&self) -> Result<Bytes> {
        let topic = Topic::Info(InfoKey::DeviceSerial);
        match self.info(InfoKey::DeviceSerial).await? {
            EventPayload::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected(topic, &other)),
        }
    }

    pub async fn print_status(&self) -> Result<PrintStatus> {
        let topic = Topic::PrintStatus;
        match self.request(command::get_print_status(), topic, None).await? {
            EventPayload::PrintStatus(status) => Ok(status),
            other => Err(unexpected(topic, &other)),
        }
    }

    pub async fn heartbeat(&self) -> Result<HeartbeatStatus> {
        let topic = Topic::Heartbeat;
        match self.request(command::heartbeat(), topic, None).await? {
            EventPayload::Heartbeat(status) => Ok(status),
            other => Err(unexpected(topic, &other)),
        }
    }
}

impl Drop for PrinterSession {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close printer session");
        }
    }
}

fn unexpected(topic: Topic, payload: &EventPayload) -> SessionError {
    SessionError::UnexpectedPayload {
        topic,
        payload: format!("{payload:?}"),
    }
}
