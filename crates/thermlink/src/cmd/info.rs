use std::collections::BTreeMap;
use std::time::Duration;

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use thermlink_frame::{command, InfoKey};
use thermlink_session::{PrinterSession, SessionConfig, Topic};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::cmd::{parse_duration, runtime, InfoArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{payload_value, OutputFormat};

#[derive(Serialize)]
struct InfoOutput {
    device: String,
    transport: &'static str,
    device_type: u16,
    properties: BTreeMap<&'static str, Value>,
    heartbeat: Option<Value>,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = SessionConfig {
        command_timeout: timeout,
        ..SessionConfig::default()
    };

    let rt = runtime()?;
    let _enter = rt.enter();
    let transport = args.device.transport();
    let transport_name = transport.transport_name();
    let mut session = PrinterSession::with_config(transport, config);
    session
        .open()
        .map_err(|err| session_error("open failed", err))?;

    let device_type = rt
        .block_on(session.device_type())
        .map_err(|err| session_error("device type query failed", err))?;

    let mut properties = BTreeMap::new();
    for key in InfoKey::ALL {
        if key == InfoKey::DeviceType {
            continue;
        }
        properties.insert(key.name(), query(&rt, &session, key, timeout));
    }

    let heartbeat = if args.heartbeat {
        Some(
            rt.block_on(session.request(command::heartbeat(), Topic::Heartbeat, None))
                .map(|payload| payload_value(&payload))
                .map_err(|err| session_error("heartbeat failed", err))?,
        )
    } else {
        None
    };

    session
        .close()
        .map_err(|err| session_error("close failed", err))?;

    let out = InfoOutput {
        device: args.device.device.clone(),
        transport: transport_name,
        device_type,
        properties,
        heartbeat,
    };
    print_info(&out, format);
    Ok(SUCCESS)
}

/// Unanswered keys are reported as null; older models do not know all of them.
fn query(rt: &Runtime, session: &PrinterSession, key: InfoKey, timeout: Duration) -> Value {
    match rt.block_on(session.request(command::get_info(key), Topic::Info(key), Some(timeout))) {
        Ok(payload) => payload_value(&payload),
        Err(err) => {
            debug!(key = key.name(), error = %err, "info key not answered");
            Value::Null
        }
    }
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PROPERTY", "VALUE"]);
            table.add_row(vec!["device".to_string(), out.device.clone()]);
            table.add_row(vec!["transport".to_string(), out.transport.to_string()]);
            table.add_row(vec!["device_type".to_string(), out.device_type.to_string()]);
            for (name, value) in &out.properties {
                table.add_row(vec![name.to_string(), display(value)]);
            }
            if let Some(heartbeat) = &out.heartbeat {
                table.add_row(vec!["heartbeat".to_string(), heartbeat.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("device: {} ({})", out.device, out.transport);
            println!("device_type: {}", out.device_type);
            for (name, value) in &out.properties {
                println!("{name}: {}", display(value));
            }
            if let Some(heartbeat) = &out.heartbeat {
                println!("heartbeat: {heartbeat}");
            }
        }
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
