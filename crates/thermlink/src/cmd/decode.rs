use std::fs;
use std::io::{Cursor, Read};

use thermlink_frame::{Packet, PacketReader};
use tracing::info;

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_packets, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = read_input(&args)?;
    let (packets, rejected) = decode_all(bytes)?;
    info!(packets = packets.len(), rejected, "decoded input");

    if packets.is_empty() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("no complete frame in input ({rejected} rejected)"),
        ));
    }

    print_packets(&packets, format);
    Ok(SUCCESS)
}

fn read_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|err| io_error("failed reading stdin", err))?;
    parse_hex(&text)
}

/// Decode every complete frame, skipping noise and corrupted frames.
fn decode_all(bytes: Vec<u8>) -> CliResult<(Vec<Packet>, u64)> {
    let mut reader = PacketReader::new(Cursor::new(bytes));
    let packets = reader
        .by_ref()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| frame_error("decode failed", err))?;
    Ok((packets, reader.rejected_frames()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resynchronizes_past_noise_and_bad_frames() {
        let bytes = parse_hex(
            "00 13 55 55 02 01 01 02 AA AA \
             55 55 31 01 01 FF AA AA \
             55 55 04 01 01 04 AA AA",
        )
        .unwrap();

        let (packets, rejected) = decode_all(bytes).unwrap();
        assert_eq!(
            packets,
            vec![Packet::with_byte(0x02, 0x01), Packet::with_byte(0x04, 0x01)]
        );
        assert_eq!(rejected, 1);
    }

    #[test]
    fn truncated_frame_yields_nothing() {
        let (packets, _) = decode_all(vec![0x55, 0x55, 0x02, 0x01]).unwrap();
        assert!(packets.is_empty());
    }
}
