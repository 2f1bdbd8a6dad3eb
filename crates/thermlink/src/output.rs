use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::{json, Value};
use thermlink_frame::{command_name, Packet};
use thermlink_session::{Event, EventPayload};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput {
    command: String,
    name: &'static str,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

impl PacketOutput {
    fn new(packet: &Packet) -> Self {
        Self {
            command: format!("{:#04x}", packet.command()),
            name: command_name(packet.command()),
            payload_size: packet.payload().len(),
            payload: hex_dump(packet.payload()),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_packet(packet: &Packet, format: OutputFormat) {
    print_packets(std::slice::from_ref(packet), format);
}

/// Print a batch of packets. Table output puts the batch in one table; the
/// other formats print one line per packet.
pub fn print_packets(packets: &[Packet], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for packet in packets {
                print_json(&PacketOutput::new(packet));
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "NAME", "SIZE", "PAYLOAD"]);
            for packet in packets {
                table.add_row(vec![
                    format!("{:#04x}", packet.command()),
                    command_name(packet.command()).to_string(),
                    packet.payload().len().to_string(),
                    hex_dump(packet.payload()),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for packet in packets {
                println!(
                    "command={:#04x} ({}) size={} payload=[{}]",
                    packet.command(),
                    command_name(packet.command()),
                    packet.payload().len(),
                    hex_dump(packet.payload())
                );
            }
        }
        OutputFormat::Raw => {
            for packet in packets {
                print_raw(packet.payload());
            }
        }
    }
}

#[derive(Serialize)]
struct EventOutput {
    topic: String,
    kind: &'static str,
    value: Value,
    timestamp: String,
}

/// Print a decoded bus event.
pub fn print_event(event: &Event, format: OutputFormat) {
    let value = payload_value(&event.payload);
    match format {
        OutputFormat::Json => print_json(&EventOutput {
            topic: event.topic.to_string(),
            kind: event.payload.kind(),
            value,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TOPIC", "KIND", "VALUE"])
                .add_row(vec![
                    event.topic.to_string(),
                    event.payload.kind().to_string(),
                    value.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{} {}={}", event.topic, event.payload.kind(), value);
        }
        OutputFormat::Raw => {
            println!("{value}");
        }
    }
}

/// Print an encoded frame.
pub fn print_frame_bytes(packet: &Packet, frame: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&json!({
            "command": format!("{:#04x}", packet.command()),
            "name": command_name(packet.command()),
            "frame": hex_dump(frame),
            "frame_size": frame.len(),
        })),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "NAME", "FRAME"])
                .add_row(vec![
                    format!("{:#04x}", packet.command()),
                    command_name(packet.command()).to_string(),
                    hex_dump(frame),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", hex_dump(frame)),
        OutputFormat::Raw => print_raw(frame),
    }
}

/// JSON view of an event payload.
pub fn payload_value(payload: &EventPayload) -> Value {
    match payload {
        EventPayload::Packet(packet) => json!({
            "command": format!("{:#04x}", packet.command()),
            "payload": hex_dump(packet.payload()),
        }),
        EventPayload::Bool(value) => json!(value),
        EventPayload::Number(value) => json!(value),
        EventPayload::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) if !text.is_empty() && text.chars().all(|c| c.is_ascii_graphic()) => {
                json!(text)
            }
            _ => json!(hex_dump(bytes)),
        },
        EventPayload::PrintStatus(status) => json!({
            "page": status.page,
            "progress1": status.progress1,
            "progress2": status.progress2,
        }),
        EventPayload::Heartbeat(status) => json!({
            "closing_state": status.closing_state,
            "power_level": status.power_level,
            "paper_state": status.paper_state,
            "rfid_read_state": status.rfid_read_state,
        }),
        EventPayload::Stopped { error } => json!({ "error": error }),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Space-separated uppercase hex, e.g. `55 55 01`.
pub fn hex_dump(data: &[u8]) -> String {
    let digits = hex::encode_upper(data);
    let mut out = String::with_capacity(digits.len() + digits.len() / 2);
    for (i, pair) in digits.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.extend(pair.iter().map(|&c| char::from(c)));
    }
    out
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn hex_is_spaced_uppercase() {
        assert_eq!(hex_dump(&[0x55, 0x0a, 0xAA]), "55 0A AA");
        assert_eq!(hex_dump(&[]), "");
    }

    #[test]
    fn printable_serial_stays_text() {
        let value = payload_value(&EventPayload::Bytes(Bytes::from_static(b"H123")));
        assert_eq!(value, json!("H123"));

        let value = payload_value(&EventPayload::Bytes(Bytes::from_static(&[0x00, 0x01])));
        assert_eq!(value, json!("00 01"));
    }
}
