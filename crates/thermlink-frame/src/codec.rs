use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::packet::Packet;

/// Frame header bytes.
pub const HEADER: [u8; 2] = [0x55, 0x55];

/// Frame footer bytes.
pub const FOOTER: [u8; 2] = [0xAA, 0xAA];

/// Largest payload the 1-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// header (2) + command (1) + length (1) + checksum (1) + footer (2).
pub const FRAME_OVERHEAD: usize = 7;

/// Offset of the payload inside a frame.
const PAYLOAD_OFFSET: usize = 4;

/// XOR of the command code, the payload length and every payload byte.
pub fn checksum(command: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(command ^ payload.len() as u8, |acc, b| acc ^ b)
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬─────────┬────────┬──────────────┬──────────┬───────────┐
/// │ Header    │ Command │ Length │ Payload      │ Checksum │ Footer    │
/// │ 0x55 0x55 │ (1B)    │ (1B)   │ (Length B)   │ (1B XOR) │ 0xAA 0xAA │
/// └───────────┴─────────┴────────┴──────────────┴──────────┴───────────┘
/// ```
pub fn encode_frame(command: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(FRAME_OVERHEAD + payload.len());
    dst.put_slice(&HEADER);
    dst.put_u8(command);
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);
    dst.put_u8(checksum(command, payload));
    dst.put_slice(&FOOTER);
    Ok(())
}

/// Encode a command and payload into a standalone frame.
pub fn encode(command: u8, payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(FRAME_OVERHEAD + payload.len());
    encode_frame(command, payload, &mut dst)?;
    Ok(dst.freeze())
}

/// Outcome of one [`scan_and_decode`] pass over a buffer.
#[derive(Debug)]
pub enum Scan {
    /// A valid frame was decoded. `consumed` runs through its footer,
    /// including any noise before its header.
    Decoded { packet: Packet, consumed: usize },
    /// A header was found but the frame failed validation. `consumed` stops
    /// one byte past that header so the next scan resynchronizes.
    Rejected { error: FrameError, consumed: usize },
    /// No header in the buffer; `consumed` bytes are noise.
    Skipped { consumed: usize },
    /// Nothing can be decoded until more bytes arrive. Nothing was consumed.
    NeedMore,
}

impl Scan {
    /// Bytes the caller must drop from the front of the buffer.
    pub fn consumed(&self) -> usize {
        match self {
            Scan::Decoded { consumed, .. }
            | Scan::Rejected { consumed, .. }
            | Scan::Skipped { consumed } => *consumed,
            Scan::NeedMore => 0,
        }
    }

    /// Split into the decoded packet (if any) and the consumed byte count.
    pub fn into_parts(self) -> (Option<Packet>, usize) {
        match self {
            Scan::Decoded { packet, consumed } => (Some(packet), consumed),
            other => (None, other.consumed()),
        }
    }
}

/// Scan `buf` for the first frame and try to decode it.
///
/// The buffer is never modified; the caller drops [`Scan::consumed`] bytes and
/// appends new input before scanning again. A scan that consumes nothing means
/// more input is needed.
pub fn scan_and_decode(buf: &[u8]) -> Scan {
    let Some(start) = find_header(buf) else {
        // Keep a trailing header byte: its partner may still be in flight.
        let keep = usize::from(buf.last() == Some(&HEADER[0]));
        let consumed = buf.len() - keep;
        return if consumed == 0 {
            Scan::NeedMore
        } else {
            Scan::Skipped { consumed }
        };
    };

    let frame = &buf[start..];
    if frame.len() < PAYLOAD_OFFSET {
        return Scan::NeedMore;
    }

    let command = frame[2];
    let len = usize::from(frame[3]);
    let total = FRAME_OVERHEAD + len;
    if frame.len() < total {
        return Scan::NeedMore;
    }

    let payload = &frame[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len];
    let carried = frame[PAYLOAD_OFFSET + len];
    let computed = checksum(command, payload);
    if carried != computed {
        return Scan::Rejected {
            error: FrameError::ChecksumMismatch {
                expected: computed,
                actual: carried,
            },
            consumed: start + 1,
        };
    }

    let footer = [frame[total - 2], frame[total - 1]];
    if footer != FOOTER {
        return Scan::Rejected {
            error: FrameError::InvalidFooter { found: footer },
            consumed: start + 1,
        };
    }

    Scan::Decoded {
        packet: Packet::from_wire(command, Bytes::copy_from_slice(payload)),
        consumed: start + total,
    }
}

fn find_header(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER.len()).position(|w| w == HEADER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(command: u8, payload: &[u8]) -> Vec<u8> {
        encode(command, payload).unwrap().to_vec()
    }

    #[test]
    fn reference_frame_bytes() {
        let wire = encode(0x01, &[0x01]).unwrap();
        assert_eq!(
            wire.as_ref(),
            &[0x55, 0x55, 0x01, 0x01, 0x01, 0x01, 0xAA, 0xAA]
        );

        let (packet, consumed) = scan_and_decode(&wire).into_parts();
        assert_eq!(packet, Some(Packet::with_byte(0x01, 0x01)));
        assert_eq!(consumed, 8);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let payload = b"\x00\x10\x55\x55\xAA\xAA\xff";
        let wire = frame(0x85, payload);
        assert_eq!(wire.len(), FRAME_OVERHEAD + payload.len());

        match scan_and_decode(&wire) {
            Scan::Decoded { packet, consumed } => {
                assert_eq!(packet.command(), 0x85);
                assert_eq!(packet.payload().as_ref(), payload);
                assert_eq!(consumed, wire.len());
            }
            other => panic!("expected a decoded frame, got {other:?}"),
        }
    }

    #[test]
    fn empty_and_maximal_payloads() {
        let empty = frame(0xDC, &[]);
        assert_eq!(empty.len(), FRAME_OVERHEAD);
        let (packet, _) = scan_and_decode(&empty).into_parts();
        assert!(packet.unwrap().payload().is_empty());

        let full = frame(0x85, &[0x5A; MAX_PAYLOAD]);
        let (packet, consumed) = scan_and_decode(&full).into_parts();
        assert_eq!(packet.unwrap().payload().len(), MAX_PAYLOAD);
        assert_eq!(consumed, FRAME_OVERHEAD + MAX_PAYLOAD);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let mut dst = BytesMut::new();
        let err = encode_frame(0x01, &[0u8; MAX_PAYLOAD + 1], &mut dst).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(dst.is_empty());
    }

    #[test]
    fn checksum_covers_command_length_and_payload() {
        assert_eq!(checksum(0x01, &[0x01]), 0x01);
        assert_eq!(checksum(0x40, &[0x08]), 0x40 ^ 0x01 ^ 0x08);
        assert_eq!(checksum(0xDC, &[]), 0xDC);
    }

    #[test]
    fn incomplete_frame_consumes_nothing() {
        let wire = frame(0x21, &[0x03]);
        for cut in 0..wire.len() {
            let scan = scan_and_decode(&wire[..cut]);
            assert!(
                matches!(scan, Scan::NeedMore),
                "prefix of {cut} bytes should need more, got {scan:?}"
            );
        }
    }

    #[test]
    fn incomplete_frame_after_noise_consumes_nothing() {
        let mut wire = vec![0x00, 0x13, 0x37];
        wire.extend_from_slice(&frame(0x21, &[0x03])[..5]);
        assert!(matches!(scan_and_decode(&wire), Scan::NeedMore));
    }

    #[test]
    fn leading_noise_is_consumed_with_the_frame() {
        let mut wire = vec![0xDE, 0xAD, 0x00];
        wire.extend_from_slice(&frame(0x02, &[0x01]));

        let (packet, consumed) = scan_and_decode(&wire).into_parts();
        assert_eq!(packet, Some(Packet::with_byte(0x02, 0x01)));
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn stray_header_byte_before_frame_resyncs() {
        // 0x55 noise pairs with the real header's first byte and yields a bogus frame start.
        let mut wire = vec![0xDE, 0xAD, 0x55];
        wire.extend_from_slice(&frame(0x02, &[0x01]));

        let first = scan_and_decode(&wire);
        assert!(matches!(first, Scan::Rejected { consumed: 3, .. }));

        let (packet, consumed) = scan_and_decode(&wire[3..]).into_parts();
        assert_eq!(packet, Some(Packet::with_byte(0x02, 0x01)));
        assert_eq!(consumed, wire.len() - 3);
    }

    #[test]
    fn corrupted_checksum_is_rejected_and_resyncs() {
        let mut wire = vec![0x00];
        wire.extend_from_slice(&frame(0x31, &[0x01]));
        wire[6] ^= 0xFF;

        match scan_and_decode(&wire) {
            Scan::Rejected { error, consumed } => {
                assert!(matches!(error, FrameError::ChecksumMismatch { .. }));
                assert_eq!(consumed, 2);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn corrupted_footer_is_rejected() {
        let mut wire = frame(0x31, &[0x01]);
        let last = wire.len() - 1;
        wire[last] = 0x00;

        match scan_and_decode(&wire) {
            Scan::Rejected { error, consumed } => {
                assert!(matches!(
                    error,
                    FrameError::InvalidFooter { found: [0xAA, 0x00] }
                ));
                assert_eq!(consumed, 1);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn corrupted_stream_always_makes_progress() {
        let mut wire = frame(0x31, &[0x01]);
        wire[5] ^= 0x40;
        wire.extend_from_slice(&frame(0x48, &[0x00, 0x01]));

        let mut buf = wire.as_slice();
        let mut packets = Vec::new();
        for _ in 0..wire.len() {
            let (packet, consumed) = scan_and_decode(buf).into_parts();
            packets.extend(packet);
            if consumed == 0 {
                break;
            }
            buf = &buf[consumed..];
        }

        assert_eq!(packets, vec![Packet::new(0x48, vec![0x00, 0x01]).unwrap()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn pure_noise_is_skipped_except_trailing_header_byte() {
        let scan = scan_and_decode(&[0x01, 0x02, 0x03]);
        assert!(matches!(scan, Scan::Skipped { consumed: 3 }));

        let scan = scan_and_decode(&[0x01, 0x02, 0x55]);
        assert!(matches!(scan, Scan::Skipped { consumed: 2 }));

        assert!(matches!(scan_and_decode(&[0x55]), Scan::NeedMore));
        assert!(matches!(scan_and_decode(&[]), Scan::NeedMore));
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut wire = frame(0x02, &[0x01]);
        wire.extend_from_slice(&frame(0xF4, &[0x01]));

        let (first, consumed) = scan_and_decode(&wire).into_parts();
        assert_eq!(first.unwrap().command(), 0x02);
        let (second, rest) = scan_and_decode(&wire[consumed..]).into_parts();
        assert_eq!(second.unwrap().command(), 0xF4);
        assert_eq!(consumed + rest, wire.len());
    }
}
