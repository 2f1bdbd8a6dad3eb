use std::sync::Arc;

use thermlink_frame::{command_name, Packet};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::bus::{EventBus, EventPayload, Topic};
use crate::decoder::{builtin_decoders, Decoder};
use crate::error::SessionError;

/// Ordered decoder list that republishes uplinked packets as typed events.
///
/// Dispatch stops at the first decoder that recognizes a packet; packets no
/// decoder recognizes are logged and dropped.
pub struct DecoderRegistry {
    bus: EventBus,
    decoders: Vec<Box<dyn Decoder>>,
}

impl DecoderRegistry {
    /// A registry with no decoders.
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            decoders: Vec::new(),
        }
    }

    /// A registry with the built-in decoders.
    pub fn with_builtin(bus: EventBus) -> Self {
        Self {
            bus,
            decoders: builtin_decoders(),
        }
    }

    /// Append a decoder; it runs after every decoder already registered.
    pub fn register(&mut self, decoder: impl Decoder + 'static) -> &mut Self {
        self.decoders.push(Box::new(decoder));
        self
    }

    /// Bus the registry reads packets from and publishes events on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Offer `packet` to each decoder in order and publish the first match.
    ///
    /// Returns `false` when no decoder recognized the packet.
    pub fn decode(&self, packet: &Packet) -> bool {
        for decoder in &self.decoders {
            if let Some(event) = decoder.decode(packet) {
                trace!(decoder = decoder.name(), topic = %event.topic, "packet decoded");
                self.bus.publish(event);
                return true;
            }
        }
        warn!(
            command = format_args!("{:#04x}", packet.command()),
            name = command_name(packet.command()),
            len = packet.payload().len(),
            "no decoder for packet"
        );
        false
    }

    /// Feed every uplinked packet through [`decode`](Self::decode) on a Tokio task.
    ///
    /// The subscription is taken before this returns, so no packet published
    /// afterwards is missed. The task ends when `cancel` fires or the bus closes.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        self.spawn_on(&Handle::current(), cancel)
    }

    /// [`spawn`](Self::spawn) onto an explicit runtime.
    pub fn spawn_on(
        self: Arc<Self>,
        runtime: &Handle,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut packets = self.bus.subscribe_to(Topic::UplinkedPacket);
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("decoder dispatch cancelled");
                        break;
                    }
                    event = packets.recv() => match event {
                        Ok(event) => {
                            if let EventPayload::Packet(packet) = &event.payload {
                                self.decode(packet);
                            }
                        }
                        Err(SessionError::BusClosed) => {
                            debug!("event bus closed, decoder dispatch exiting");
                            break;
                        }
                        Err(err) => {
                            warn!(error = %err, "decoder dispatch failed");
                            break;
                        }
                    },
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use thermlink_frame::InfoKey;

    use super::*;
    use crate::bus::Event;

    struct Always(Topic);

    impl Decoder for Always {
        fn name(&self) -> &'static str {
            "always"
        }

        fn decode(&self, _packet: &Packet) -> Option<Event> {
            Some(Event::new(self.0, EventPayload::Bool(true)))
        }
    }

    #[test]
    fn first_match_wins() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let mut registry = DecoderRegistry::new(bus);
        registry.register(Always(Topic::PrintStarted));
        registry.register(Always(Topic::PrintEnded));

        assert!(registry.decode(&Packet::with_byte(0x99, 0x01)));
        assert_eq!(events.try_recv().unwrap().unwrap().topic, Topic::PrintStarted);
        assert!(events.try_recv().unwrap().is_none());
    }

    #[test]
    fn unrecognized_packet_returns_false() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let registry = DecoderRegistry::with_builtin(bus);

        assert!(!registry.decode(&Packet::with_byte(0x77, 0x01)));
        assert!(events.try_recv().unwrap().is_none());
    }

    #[test]
    fn device_type_beats_generic_info() {
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let registry = DecoderRegistry::with_builtin(bus);

        let packet = Packet::new(InfoKey::DeviceType.response_code(), vec![0x00, 0x10]).unwrap();
        assert!(registry.decode(&packet));
        let event = events.try_recv().unwrap().unwrap();
        assert_eq!(event, Event::new(Topic::DeviceType, EventPayload::Number(16)));
    }

    #[tokio::test]
    async fn spawned_dispatch_republishes_uplinked_packets() {
        let bus = EventBus::new();
        let mut cleared = bus.subscribe_to(Topic::PrintCleared);
        let registry = Arc::new(DecoderRegistry::with_builtin(bus.clone()));
        let cancel = CancellationToken::new();
        let task = registry.spawn(cancel.clone());

        bus.publish(Event::new(
            Topic::UplinkedPacket,
            EventPayload::Packet(Packet::with_byte(0x30, 0x01)),
        ));

        let event = tokio::time::timeout(Duration::from_secs(2), cleared.recv())
            .await
            .expect("decoded event should arrive")
            .unwrap();
        assert_eq!(event.payload, EventPayload::Bool(true));

        cancel.cancel();
        task.await.expect("dispatch task should exit");
    }
}
