use thermlink_frame::Packet;
use thermlink_session::{Event, PrinterSession, SessionConfig};

use crate::cmd::{parse_duration, parse_hex, runtime, SendArgs};
use crate::exit::{frame_error, session_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = parse_hex(&args.payload)?;
    let packet =
        Packet::new(args.command, payload).map_err(|err| frame_error("invalid packet", err))?;
    let config = SessionConfig {
        command_timeout: parse_duration(&args.timeout)?,
        ..SessionConfig::default()
    };

    let rt = runtime()?;
    let _enter = rt.enter();
    let mut session = PrinterSession::with_config(args.device.transport(), config);
    session
        .open()
        .map_err(|err| session_error("open failed", err))?;

    match args.wait_topic {
        None => session
            .send(&packet)
            .map_err(|err| session_error("send failed", err))?,
        Some(topic) => {
            let reply = rt
                .block_on(session.request(packet, topic, None))
                .map_err(|err| session_error("request failed", err))?;
            print_event(&Event::new(topic, reply), format);
        }
    }

    session
        .close()
        .map_err(|err| session_error("close failed", err))?;
    Ok(SUCCESS)
}
