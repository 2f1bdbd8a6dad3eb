use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use thermlink_session::Topic;
use thermlink_transport::{
    BdAddr, PushAdapter, RfcommConfig, RfcommSocket, SerialConfig, SerialPort, Transport,
};
use tokio::runtime::Runtime;

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod info;
pub mod monitor;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode one command into a wire frame.
    Encode(EncodeArgs),
    /// Decode frames from a hex dump or a capture file.
    Decode(DecodeArgs),
    /// Print what a printer sends until interrupted.
    Monitor(MonitorArgs),
    /// Send one command, optionally waiting for its reply.
    Send(SendArgs),
    /// Query device type and properties.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Serial device path, or Bluetooth address (AA:BB:CC:DD:EE:FF).
    #[arg(env = "THERMLINK_DEVICE")]
    pub device: String,
    /// Line speed for serial devices.
    #[arg(long, env = "THERMLINK_BAUD", default_value_t = 115_200)]
    pub baud: u32,
    /// RFCOMM channel when DEVICE is a Bluetooth address.
    #[arg(long, default_value_t = 1)]
    pub rfcomm_channel: u8,
}

impl DeviceArgs {
    /// Build the transport DEVICE names, without opening it.
    pub fn transport(&self) -> Arc<dyn Transport> {
        match self.device.parse::<BdAddr>() {
            Ok(address) => {
                let config = RfcommConfig {
                    channel: self.rfcomm_channel,
                    ..RfcommConfig::default()
                };
                Arc::new(PushAdapter::new(RfcommSocket::with_config(address, config)))
            }
            Err(_) => {
                let config = SerialConfig {
                    baud_rate: Some(self.baud),
                    ..SerialConfig::default()
                };
                Arc::new(SerialPort::with_config(&self.device, config))
            }
        }
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Command code (e.g. 0x21 or 33).
    #[arg(long, short = 'c', value_parser = parse_byte)]
    pub command: u8,
    /// Payload as hex (e.g. "03" or "00 F0 01 80").
    #[arg(long, short = 'p', default_value = "")]
    pub payload: String,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex dump of the byte stream. Reads stdin when neither this nor --file is given.
    #[arg(conflicts_with = "file")]
    pub hex: Option<String>,
    /// Binary capture file.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Print raw packets instead of decoded events.
    #[arg(long)]
    pub packets: bool,
    /// Exit after printing N records.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Command code (e.g. 0x21 or 33).
    #[arg(long, short = 'c', value_parser = parse_byte)]
    pub command: u8,
    /// Payload as hex.
    #[arg(long, short = 'p', default_value = "")]
    pub payload: String,
    /// Wait for an event on this topic (e.g. density_set, info.battery) and print it.
    #[arg(long, value_parser = parse_topic)]
    pub wait_topic: Option<Topic>,
    /// Reply deadline when --wait-topic is set (e.g. 5s, 500ms).
    #[arg(long, env = "THERMLINK_TIMEOUT", default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Per-query deadline (e.g. 5s, 500ms).
    #[arg(long, env = "THERMLINK_TIMEOUT", default_value = "2s")]
    pub timeout: String,
    /// Also request a heartbeat.
    #[arg(long)]
    pub heartbeat: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn runtime() -> CliResult<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("thermlink-rt")
        .enable_time()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

pub fn parse_byte(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("not a byte value: {input}"))
}

fn parse_topic(input: &str) -> Result<Topic, String> {
    input.parse()
}

/// Parse a hex dump. Bytes may be separated by spaces, commas or colons and
/// carry an optional `0x` prefix; unseparated runs are split in pairs.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let mut out = Vec::new();
    for token in input.split(|c: char| c.is_whitespace() || c == ',' || c == ':') {
        let token = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if token.is_empty() {
            continue;
        }
        let bytes = hex::decode(token)
            .map_err(|err| CliError::new(USAGE, format!("invalid hex {token:?}: {err}")))?;
        out.extend(bytes);
    }
    Ok(out)
}
