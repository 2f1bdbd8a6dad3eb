use thermlink_frame::Packet;

use crate::cmd::{parse_hex, EncodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frame_bytes, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = parse_hex(&args.payload)?;
    let packet =
        Packet::new(args.command, payload).map_err(|err| frame_error("encode failed", err))?;
    print_frame_bytes(&packet, &packet.to_frame(), format);
    Ok(SUCCESS)
}
