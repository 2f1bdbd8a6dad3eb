//! Print every packet a printer sends, without decoding.
//!
//! Run with:
//!   cargo run --example watch-uplink -- /dev/ttyUSB0

use std::sync::Arc;

use thermlink::frame::command_name;
use thermlink::session::{EventBus, EventPayload, UplinkProcessor};
use thermlink::transport::{SerialPort, Transport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let device = std::env::args()
        .nth(1)
        .ok_or("usage: watch-uplink <device>")?;

    let port = Arc::new(SerialPort::new(&device));
    port.open()?;

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let processor = UplinkProcessor::new(port, bus);
    processor.start_processing()?;
    eprintln!("Watching {device}");

    loop {
        let event = events.blocking_recv()?;
        match event.payload {
            EventPayload::Packet(packet) => {
                println!("{:<22} {packet}", command_name(packet.command()));
            }
            EventPayload::Stopped { error } => {
                eprintln!("uplink stopped: {}", error.as_deref().unwrap_or("closed"));
                break;
            }
            _ => {}
        }
    }
    Ok(())
}
