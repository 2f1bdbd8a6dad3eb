use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thermlink_session::{EventPayload, PrinterSession, SessionError, Topic};
use tracing::info;

use crate::cmd::{runtime, MonitorArgs};
use crate::exit::{session_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_event, print_packet, OutputFormat};

const TICK: Duration = Duration::from_millis(200);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let rt = runtime()?;
    let _enter = rt.enter();

    let mut session = PrinterSession::new(args.device.transport());
    let mut events = session.bus().subscribe();
    session
        .open()
        .map_err(|err| session_error("open failed", err))?;
    info!(device = %args.device.device, "monitoring");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    let mut code = SUCCESS;

    while running.load(Ordering::SeqCst) {
        let event = match rt.block_on(tokio::time::timeout(TICK, events.recv())) {
            Err(_elapsed) => continue,
            Ok(Ok(event)) => event,
            Ok(Err(SessionError::BusClosed)) => break,
            Ok(Err(err)) => return Err(session_error("receive failed", err)),
        };

        match (&event.topic, &event.payload) {
            (Topic::UplinkStopped, EventPayload::Stopped { error }) => {
                if let Some(error) = error {
                    code = FAILURE;
                    eprintln!("error: uplink stopped: {error}");
                }
                break;
            }
            (Topic::UplinkedPacket, EventPayload::Packet(packet)) if args.packets => {
                print_packet(packet, format);
            }
            (Topic::UplinkedPacket, _) => continue,
            _ if args.packets => continue,
            _ => print_event(&event, format),
        }

        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    session
        .close()
        .map_err(|err| session_error("close failed", err))?;
    Ok(code)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
