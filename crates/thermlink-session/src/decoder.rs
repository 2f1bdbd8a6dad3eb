//! Packet decoders.
//!
//! A decoder looks at one uplinked [`Packet`] and, when it recognizes the
//! command code and the payload has the shape it expects, turns it into a
//! typed [`Event`]. Decoders are tried in registration order by the
//! [`DecoderRegistry`](crate::registry::DecoderRegistry).

use thermlink_frame::command::{
    ALLOW_PRINT_CLEAR_ACK, END_PAGE_PRINT_ACK, END_PRINT_ACK, HEARTBEAT_REPLY, PRINT_STATUS,
    SET_DIMENSION_ACK, SET_LABEL_DENSITY_ACK, SET_LABEL_TYPE_ACK, SET_QUANTITY_ACK,
    START_PAGE_PRINT_ACK, START_PRINT_ACK,
};
use thermlink_frame::{InfoKey, Packet};

use crate::bus::{Event, EventPayload, HeartbeatStatus, PrintStatus, Topic};

/// Turns a raw packet into a domain event.
pub trait Decoder: Send + Sync {
    /// Name for diagnostics.
    fn name(&self) -> &'static str;

    /// Return the event for `packet`, or `None` if this decoder does not handle it.
    fn decode(&self, packet: &Packet) -> Option<Event>;
}

/// Maps a one-byte acknowledgement to a boolean event.
#[derive(Debug, Clone, Copy)]
pub struct AckDecoder {
    command: u8,
    topic: Topic,
}

impl AckDecoder {
    pub const fn new(command: u8, topic: Topic) -> Self {
        Self { command, topic }
    }
}

impl Decoder for AckDecoder {
    fn name(&self) -> &'static str {
        "ack"
    }

    fn decode(&self, packet: &Packet) -> Option<Event> {
        if packet.command() != self.command {
            return None;
        }
        let value = packet.first_byte()?;
        Some(Event::new(self.topic, EventPayload::Bool(value != 0)))
    }
}

/// The acknowledgements every printer sends, with the topic each maps to.
pub const ACKS: [AckDecoder; 9] = [
    AckDecoder::new(START_PRINT_ACK, Topic::PrintStarted),
    AckDecoder::new(END_PRINT_ACK, Topic::PrintEnded),
    AckDecoder::new(START_PAGE_PRINT_ACK, Topic::PageStarted),
    AckDecoder::new(END_PAGE_PRINT_ACK, Topic::PageEnded),
    AckDecoder::new(SET_DIMENSION_ACK, Topic::DimensionSet),
    AckDecoder::new(SET_QUANTITY_ACK, Topic::QuantitySet),
    AckDecoder::new(ALLOW_PRINT_CLEAR_ACK, Topic::PrintCleared),
    AckDecoder::new(SET_LABEL_DENSITY_ACK, Topic::DensitySet),
    AckDecoder::new(SET_LABEL_TYPE_ACK, Topic::LabelTypeSet),
];

/// Device model number, answered on the device-type info code.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceTypeDecoder;

impl Decoder for DeviceTypeDecoder {
    fn name(&self) -> &'static str {
        "device_type"
    }

    fn decode(&self, packet: &Packet) -> Option<Event> {
        if packet.command() != InfoKey::DeviceType.response_code() {
            return None;
        }
        let value = match packet.payload().as_ref() {
            [hi, lo, ..] => u16::from_be_bytes([*hi, *lo]),
            [only] => u16::from(*only),
            [] => return None,
        };
        Some(Event::new(Topic::DeviceType, EventPayload::Number(i64::from(value))))
    }
}

/// Any info reply. The serial number is published as raw bytes, every other
/// key as a big-endian integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfoDecoder;

impl Decoder for InfoDecoder {
    fn name(&self) -> &'static str {
        "info"
    }

    fn decode(&self, packet: &Packet) -> Option<Event> {
        let key = InfoKey::from_response_code(packet.command())?;
        let payload = packet.payload();
        let value = match key {
            InfoKey::DeviceSerial => EventPayload::Bytes(payload.clone()),
            _ if payload.is_empty() || payload.len() > 8 => return None,
            _ => EventPayload::Number(
                payload
                    .iter()
                    .fold(0i64, |acc, byte| (acc << 8) | i64::from(*byte)),
            ),
        };
        Some(Event::new(Topic::Info(key), value))
    }
}

/// Heartbeat reply. The layout is chosen by payload length.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeartbeatDecoder;

impl HeartbeatDecoder {
    fn parse(data: &[u8]) -> Option<HeartbeatStatus> {
        let status = match data.len() {
            20 => HeartbeatStatus {
                paper_state: Some(data[18]),
                rfid_read_state: Some(data[19]),
                ..HeartbeatStatus::default()
            },
            19 => HeartbeatStatus {
                closing_state: Some(data[15]),
                power_level: Some(data[16]),
                paper_state: Some(data[17]),
                rfid_read_state: Some(data[18]),
            },
            13 => HeartbeatStatus {
                closing_state: Some(data[9]),
                power_level: Some(data[10]),
                paper_state: Some(data[11]),
                rfid_read_state: Some(data[12]),
            },
            10 => HeartbeatStatus {
                closing_state: Some(data[8]),
                power_level: Some(data[9]),
                rfid_read_state: Some(data[8]),
                ..HeartbeatStatus::default()
            },
            9 => HeartbeatStatus {
                closing_state: Some(data[8]),
                ..HeartbeatStatus::default()
            },
            _ => return None,
        };
        Some(status)
    }
}

impl Decoder for HeartbeatDecoder {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn decode(&self, packet: &Packet) -> Option<Event> {
        if packet.command() != HEARTBEAT_REPLY {
            return None;
        }
        let status = Self::parse(packet.payload())?;
        Some(Event::new(Topic::Heartbeat, EventPayload::Heartbeat(status)))
    }
}

/// Print progress: `page:u16be progress1:u8 progress2:u8`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintStatusDecoder;

impl Decoder for PrintStatusDecoder {
    fn name(&self) -> &'static str {
        "print_status"
    }

    fn decode(&self, packet: &Packet) -> Option<Event> {
        if packet.command() != PRINT_STATUS {
            return None;
        }
        let [hi, lo, progress1, progress2, ..] = packet.payload().as_ref() else {
            return None;
        };
        Some(Event::new(
            Topic::PrintStatus,
            EventPayload::PrintStatus(PrintStatus {
                page: u16::from_be_bytes([*hi, *lo]),
                progress1: *progress1,
                progress2: *progress2,
            }),
        ))
    }
}

/// The built-in decoders in dispatch order.
pub fn builtin_decoders() -> Vec<Box<dyn Decoder>> {
    let mut decoders: Vec<Box<dyn Decoder>> = ACKS
        .iter()
        .map(|ack| Box::new(*ack) as Box<dyn Decoder>)
        .collect();
    decoders.push(Box::new(DeviceTypeDecoder));
    decoders.push(Box::new(InfoDecoder));
    decoders.push(Box::new(HeartbeatDecoder));
    decoders.push(Box::new(PrintStatusDecoder));
    decoders
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn ack_maps_to_bool() {
        let decoder = AckDecoder::new(START_PRINT_ACK, Topic::PrintStarted);

        let ok = decoder.decode(&Packet::with_byte(0x02, 0x01)).unwrap();
        assert_eq!(ok, Event::new(Topic::PrintStarted, EventPayload::Bool(true)));

        let refused = decoder.decode(&Packet::with_byte(0x02, 0x00)).unwrap();
        assert_eq!(refused.payload, EventPayload::Bool(false));
    }

    #[test]
    fn ack_ignores_other_codes_and_empty_payloads() {
        let decoder = AckDecoder::new(START_PRINT_ACK, Topic::PrintStarted);
        assert!(decoder.decode(&Packet::with_byte(0x04, 0x01)).is_none());
        assert!(decoder.decode(&Packet::new(0x02, Vec::new()).unwrap()).is_none());
    }

    #[test]
    fn device_type_is_big_endian() {
        let packet = Packet::new(0x48, vec![0x01, 0x00]).unwrap();
        let event = DeviceTypeDecoder.decode(&packet).unwrap();
        assert_eq!(event, Event::new(Topic::DeviceType, EventPayload::Number(256)));
    }

    #[test]
    fn info_numbers_and_serial_bytes() {
        let battery = Packet::with_byte(InfoKey::Battery.response_code(), 4);
        assert_eq!(
            InfoDecoder.decode(&battery).unwrap(),
            Event::new(Topic::Info(InfoKey::Battery), EventPayload::Number(4))
        );

        let version =
            Packet::new(InfoKey::SoftwareVersion.response_code(), vec![0x01, 0x2C]).unwrap();
        assert_eq!(
            InfoDecoder.decode(&version).unwrap().payload,
            EventPayload::Number(300)
        );

        let serial = Packet::new(InfoKey::DeviceSerial.response_code(), b"A1B2".to_vec()).unwrap();
        assert_eq!(
            InfoDecoder.decode(&serial).unwrap().payload,
            EventPayload::Bytes(Bytes::from_static(b"A1B2"))
        );
    }

    #[test]
    fn heartbeat_layouts() {
        let mut data = vec![0u8; 13];
        data[9] = 1;
        data[10] = 4;
        data[11] = 0;
        data[12] = 1;
        let event = HeartbeatDecoder
            .decode(&Packet::new(HEARTBEAT_REPLY, data).unwrap())
            .unwrap();
        assert_eq!(
            event.payload,
            EventPayload::Heartbeat(HeartbeatStatus {
                closing_state: Some(1),
                power_level: Some(4),
                paper_state: Some(0),
                rfid_read_state: Some(1),
            })
        );

        let short = HeartbeatDecoder
            .decode(&Packet::new(HEARTBEAT_REPLY, vec![0u8; 9]).unwrap())
            .unwrap();
        assert!(matches!(
            short.payload,
            EventPayload::Heartbeat(HeartbeatStatus { power_level: None, .. })
        ));

        assert!(HeartbeatDecoder
            .decode(&Packet::new(HEARTBEAT_REPLY, vec![0u8; 4]).unwrap())
            .is_none());
    }

    #[test]
    fn print_status_fields() {
        let packet = Packet::new(PRINT_STATUS, vec![0x00, 0x02, 0x64, 0x32]).unwrap();
        let event = PrintStatusDecoder.decode(&packet).unwrap();
        assert_eq!(
            event.payload,
            EventPayload::PrintStatus(PrintStatus {
                page: 2,
                progress1: 100,
                progress2: 50,
            })
        );
        assert!(PrintStatusDecoder
            .decode(&Packet::new(PRINT_STATUS, vec![0x00]).unwrap())
            .is_none());
    }

    #[test]
    fn builtin_order_puts_device_type_before_info() {
        let names: Vec<&str> = builtin_decoders().iter().map(|d| d.name()).collect();
        let device = names.iter().position(|n| *n == "device_type").unwrap();
        let info = names.iter().position(|n| *n == "info").unwrap();
        assert!(device < info);
    }
}
