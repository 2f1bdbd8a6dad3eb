//! In-process publish/subscribe hub.
//!
//! Every event carries a [`Topic`] and an [`EventPayload`]. The uplink
//! processor publishes raw packets on [`Topic::UplinkedPacket`]; decoders
//! republish them as typed events on the domain topics; send-and-wait calls
//! subscribe to the topic they expect an answer on.
//!
//! Built on a `tokio::sync::broadcast` channel, so publishing works from plain
//! threads and subscribers receive every event published after they subscribed.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use thermlink_frame::{InfoKey, Packet};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{trace, warn};

use crate::error::{Result, SessionError};

/// Default number of events buffered per subscriber before it lags.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A raw packet decoded from the uplink stream.
    UplinkedPacket,
    /// The uplink processor stopped reading.
    UplinkStopped,
    PrintStarted,
    PrintEnded,
    PageStarted,
    PageEnded,
    DimensionSet,
    QuantitySet,
    PrintCleared,
    DensitySet,
    LabelTypeSet,
    DeviceType,
    Info(InfoKey),
    PrintStatus,
    Heartbeat,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Topic::UplinkedPacket => "uplinked_packet",
            Topic::UplinkStopped => "uplink_stopped",
            Topic::PrintStarted => "print_started",
            Topic::PrintEnded => "print_ended",
            Topic::PageStarted => "page_started",
            Topic::PageEnded => "page_ended",
            Topic::DimensionSet => "dimension_set",
            Topic::QuantitySet => "quantity_set",
            Topic::PrintCleared => "print_cleared",
            Topic::DensitySet => "density_set",
            Topic::LabelTypeSet => "label_type_set",
            Topic::DeviceType => "device_type",
            Topic::Info(key) => return write!(f, "info.{}", key.name()),
            Topic::PrintStatus => "print_status",
            Topic::Heartbeat => "heartbeat",
        };
        f.write_str(name)
    }
}

impl Topic {
    /// Topics that carry no key, in declaration order.
    pub const FIXED: [Topic; 14] = [
        Topic::UplinkedPacket,
        Topic::UplinkStopped,
        Topic::PrintStarted,
        Topic::PrintEnded,
        Topic::PageStarted,
        Topic::PageEnded,
        Topic::DimensionSet,
        Topic::QuantitySet,
        Topic::PrintCleared,
        Topic::DensitySet,
        Topic::LabelTypeSet,
        Topic::DeviceType,
        Topic::PrintStatus,
        Topic::Heartbeat,
    ];
}

impl FromStr for Topic {
    type Err = String;

    /// Parse the name produced by `Display`, e.g. `density_set` or `info.battery`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(key) = s.strip_prefix("info.") {
            return InfoKey::ALL
                .into_iter()
                .find(|k| k.name() == key)
                .map(Topic::Info)
                .ok_or_else(|| format!("unknown info key: {key}"));
        }
        Topic::FIXED
            .into_iter()
            .find(|topic| topic.to_string() == s)
            .ok_or_else(|| format!("unknown topic: {s}"))
    }
}

/// Progress of the current print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintStatus {
    /// Pages finished so far.
    pub page: u16,
    pub progress1: u8,
    pub progress2: u8,
}

/// Printer state carried by a heartbeat reply.
///
/// Reply layouts differ between models; fields a layout does not carry are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatStatus {
    pub closing_state: Option<u8>,
    pub power_level: Option<u8>,
    pub paper_state: Option<u8>,
    pub rfid_read_state: Option<u8>,
}

/// Data attached to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Packet(Packet),
    Bool(bool),
    Number(i64),
    Bytes(Bytes),
    PrintStatus(PrintStatus),
    Heartbeat(HeartbeatStatus),
    /// Uplink stop notice, with the read error if one ended it.
    Stopped { error: Option<String> },
}

impl EventPayload {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EventPayload::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            EventPayload::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_packet(&self) -> Option<&Packet> {
        match self {
            EventPayload::Packet(packet) => Some(packet),
            _ => None,
        }
    }

    /// Short kind label, used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Packet(_) => "packet",
            EventPayload::Bool(_) => "bool",
            EventPayload::Number(_) => "number",
            EventPayload::Bytes(_) => "bytes",
            EventPayload::PrintStatus(_) => "print_status",
            EventPayload::Heartbeat(_) => "heartbeat",
            EventPayload::Stopped { .. } => "stopped",
        }
    }
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub topic: Topic,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(topic: Topic, payload: EventPayload) -> Self {
        Self { topic, payload }
    }
}

/// Cloneable handle to the broadcast hub.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Returns the number of subscribers it reached. Publishing with no
    /// subscribers is not an error; the event is dropped.
    pub fn publish(&self, event: Event) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                trace!(topic = %event.topic, "no subscribers for event");
                0
            }
        }
    }

    /// Subscribe to every topic.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            topic: None,
        }
    }

    /// Subscribe to one topic.
    pub fn subscribe_to(&self, topic: Topic) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            topic: Some(topic),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of a bus subscription, optionally filtered to one topic.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
    topic: Option<Topic>,
}

impl Subscription {
    /// Wait for the next matching event.
    ///
    /// Lagged events are logged and skipped. Fails with
    /// [`SessionError::BusClosed`] once every bus handle is dropped.
    pub async fn recv(&mut self) -> Result<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, topic = ?self.topic, "subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return Err(SessionError::BusClosed),
            }
        }
    }

    /// Blocking variant of [`Subscription::recv`] for use outside async code.
    pub fn blocking_recv(&mut self) -> Result<Event> {
        loop {
            match self.rx.blocking_recv() {
                Ok(event) if self.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, topic = ?self.topic, "subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return Err(SessionError::BusClosed),
            }
        }
    }

    /// Return the next matching event if one is already queued.
    pub fn try_recv(&mut self) -> Result<Option<Event>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.matches(&event) => return Ok(Some(event)),
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, topic = ?self.topic, "subscriber lagged, events dropped");
                }
                Err(TryRecvError::Closed) => return Err(SessionError::BusClosed),
            }
        }
    }

    fn matches(&self, event: &Event) -> bool {
        self.topic.is_none_or(|topic| topic == event.topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let bus = EventBus::new();
        assert_eq!(
            bus.publish(Event::new(Topic::PrintStarted, EventPayload::Bool(true))),
            0
        );
    }

    #[test]
    fn topic_filter_skips_other_events() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_to(Topic::DensitySet);

        bus.publish(Event::new(Topic::PrintStarted, EventPayload::Bool(true)));
        bus.publish(Event::new(Topic::DensitySet, EventPayload::Bool(false)));

        let event = sub.try_recv().unwrap().expect("density event should be queued");
        assert_eq!(event.payload, EventPayload::Bool(false));
        assert!(sub.try_recv().unwrap().is_none());
    }

    #[test]
    fn unfiltered_subscription_sees_everything() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.publish(Event::new(Topic::PageStarted, EventPayload::Bool(true)));
        bus.publish(Event::new(Topic::PageEnded, EventPayload::Bool(true)));

        assert_eq!(sub.try_recv().unwrap().unwrap().topic, Topic::PageStarted);
        assert_eq!(sub.try_recv().unwrap().unwrap().topic, Topic::PageEnded);
    }

    #[test]
    fn events_before_subscribe_are_not_seen() {
        let bus = EventBus::new();
        bus.publish(Event::new(Topic::PrintEnded, EventPayload::Bool(true)));

        let mut sub = bus.subscribe();
        assert!(sub.try_recv().unwrap().is_none());
    }

    #[test]
    fn lagged_subscriber_keeps_receiving() {
        let bus = EventBus::with_capacity(2);
        let mut sub = bus.subscribe();

        for n in 0..5 {
            bus.publish(Event::new(Topic::QuantitySet, EventPayload::Number(n)));
        }

        let event = sub.try_recv().unwrap().expect("newest events should remain");
        assert_eq!(event.payload, EventPayload::Number(3));
    }

    #[tokio::test]
    async fn recv_fails_once_bus_is_gone() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        drop(bus);

        assert!(matches!(sub.recv().await, Err(SessionError::BusClosed)));
    }

    #[test]
    fn topic_names() {
        assert_eq!(Topic::PrintCleared.to_string(), "print_cleared");
        assert_eq!(
            Topic::Info(InfoKey::Battery).to_string(),
            "info.battery"
        );
    }

    #[test]
    fn topic_names_parse_back() {
        for topic in Topic::FIXED {
            assert_eq!(topic.to_string().parse::<Topic>(), Ok(topic));
        }
        assert_eq!(
            "info.device_serial".parse::<Topic>(),
            Ok(Topic::Info(InfoKey::DeviceSerial))
        );
        assert!("info.nope".parse::<Topic>().is_err());
        assert!("bogus".parse::<Topic>().is_err());
    }
}
