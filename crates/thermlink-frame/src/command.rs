//! Printer command table.
//!
//! Requests are answered on a response code derived from the request code:
//! most commands reply on `request + 1`, the "clear", density, label-type and
//! print-status commands reply on `request + 0x10`, and `GET_INFO` replies on
//! `0x40 + key`.

use bytes::{BufMut, BytesMut};

use crate::packet::Packet;

/// Begin a print job.
pub const START_PRINT: u8 = 0x01;
/// Begin one page of a print job.
pub const START_PAGE_PRINT: u8 = 0x03;
/// Set page height and width in dots.
pub const SET_DIMENSION: u8 = 0x13;
/// Set the number of copies.
pub const SET_QUANTITY: u8 = 0x15;
/// Clear the printer's buffered job.
pub const ALLOW_PRINT_CLEAR: u8 = 0x20;
/// Set print darkness.
pub const SET_LABEL_DENSITY: u8 = 0x21;
/// Set the label stock type.
pub const SET_LABEL_TYPE: u8 = 0x23;
/// Query a device property (see [`InfoKey`]).
pub const GET_INFO: u8 = 0x40;
/// Query progress of the current job.
pub const GET_PRINT_STATUS: u8 = 0xA3;
/// Keep-alive that also reports lid, power and paper state.
pub const HEARTBEAT: u8 = 0xDC;
/// Finish one page of a print job.
pub const END_PAGE_PRINT: u8 = 0xE3;
/// Finish a print job.
pub const END_PRINT: u8 = 0xF3;

pub const START_PRINT_ACK: u8 = START_PRINT + 1;
pub const START_PAGE_PRINT_ACK: u8 = START_PAGE_PRINT + 1;
pub const SET_DIMENSION_ACK: u8 = SET_DIMENSION + 1;
pub const SET_QUANTITY_ACK: u8 = SET_QUANTITY + 1;
pub const ALLOW_PRINT_CLEAR_ACK: u8 = ALLOW_PRINT_CLEAR + 0x10;
pub const SET_LABEL_DENSITY_ACK: u8 = SET_LABEL_DENSITY + 0x10;
pub const SET_LABEL_TYPE_ACK: u8 = SET_LABEL_TYPE + 0x10;
pub const PRINT_STATUS: u8 = GET_PRINT_STATUS + 0x10;
pub const HEARTBEAT_REPLY: u8 = HEARTBEAT + 1;
pub const END_PAGE_PRINT_ACK: u8 = END_PAGE_PRINT + 1;
pub const END_PRINT_ACK: u8 = END_PRINT + 1;

/// Device properties readable through [`GET_INFO`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoKey {
    Density,
    PrintSpeed,
    LabelType,
    LanguageType,
    AutoShutdownTime,
    DeviceType,
    SoftwareVersion,
    Battery,
    DeviceSerial,
    HardwareVersion,
}

impl InfoKey {
    pub const ALL: [InfoKey; 10] = [
        InfoKey::Density,
        InfoKey::PrintSpeed,
        InfoKey::LabelType,
        InfoKey::LanguageType,
        InfoKey::AutoShutdownTime,
        InfoKey::DeviceType,
        InfoKey::SoftwareVersion,
        InfoKey::Battery,
        InfoKey::DeviceSerial,
        InfoKey::HardwareVersion,
    ];

    /// Wire value of the key.
    pub fn code(self) -> u8 {
        match self {
            InfoKey::Density => 1,
            InfoKey::PrintSpeed => 2,
            InfoKey::LabelType => 3,
            InfoKey::LanguageType => 6,
            InfoKey::AutoShutdownTime => 7,
            InfoKey::DeviceType => 8,
            InfoKey::SoftwareVersion => 9,
            InfoKey::Battery => 10,
            InfoKey::DeviceSerial => 11,
            InfoKey::HardwareVersion => 12,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.code() == code)
    }

    /// Response code the printer answers this key on.
    pub fn response_code(self) -> u8 {
        GET_INFO + self.code()
    }

    /// Inverse of [`InfoKey::response_code`].
    pub fn from_response_code(code: u8) -> Option<Self> {
        code.checked_sub(GET_INFO).and_then(Self::from_code)
    }

    pub fn name(self) -> &'static str {
        match self {
            InfoKey::Density => "density",
            InfoKey::PrintSpeed => "print_speed",
            InfoKey::LabelType => "label_type",
            InfoKey::LanguageType => "language_type",
            InfoKey::AutoShutdownTime => "auto_shutdown_time",
            InfoKey::DeviceType => "device_type",
            InfoKey::SoftwareVersion => "software_version",
            InfoKey::Battery => "battery",
            InfoKey::DeviceSerial => "device_serial",
            InfoKey::HardwareVersion => "hardware_version",
        }
    }
}

pub fn start_print() -> Packet {
    Packet::with_byte(START_PRINT, 0x01)
}

pub fn end_print() -> Packet {
    Packet::with_byte(END_PRINT, 0x01)
}

pub fn start_page_print() -> Packet {
    Packet::with_byte(START_PAGE_PRINT, 0x01)
}

pub fn end_page_print() -> Packet {
    Packet::with_byte(END_PAGE_PRINT, 0x01)
}

pub fn allow_print_clear() -> Packet {
    Packet::with_byte(ALLOW_PRINT_CLEAR, 0x01)
}

pub fn get_print_status() -> Packet {
    Packet::with_byte(GET_PRINT_STATUS, 0x01)
}

pub fn heartbeat() -> Packet {
    Packet::with_byte(HEARTBEAT, 0x01)
}

pub fn get_info(key: InfoKey) -> Packet {
    Packet::with_byte(GET_INFO, key.code())
}

/// Print darkness, 1 (light) to 5 (dark).
pub fn set_label_density(density: u8) -> Packet {
    Packet::with_byte(SET_LABEL_DENSITY, density)
}

/// Label stock: 1 gap, 2 black mark, 3 continuous.
pub fn set_label_type(label_type: u8) -> Packet {
    Packet::with_byte(SET_LABEL_TYPE, label_type)
}

/// Page size in dots, both big-endian.
pub fn set_dimension(height: u16, width: u16) -> Packet {
    let mut payload = BytesMut::with_capacity(4);
    payload.put_u16(height);
    payload.put_u16(width);
    Packet::from_wire(SET_DIMENSION, payload.freeze())
}

pub fn set_quantity(copies: u16) -> Packet {
    let mut payload = BytesMut::with_capacity(2);
    payload.put_u16(copies);
    Packet::from_wire(SET_QUANTITY, payload.freeze())
}

/// Returns a human-readable name for a command or response code.
pub fn command_name(code: u8) -> &'static str {
    match code {
        START_PRINT => "START_PRINT",
        START_PRINT_ACK => "START_PRINT_ACK",
        START_PAGE_PRINT => "START_PAGE_PRINT",
        START_PAGE_PRINT_ACK => "START_PAGE_PRINT_ACK",
        SET_DIMENSION => "SET_DIMENSION",
        SET_DIMENSION_ACK => "SET_DIMENSION_ACK",
        SET_QUANTITY => "SET_QUANTITY",
        SET_QUANTITY_ACK => "SET_QUANTITY_ACK",
        ALLOW_PRINT_CLEAR => "ALLOW_PRINT_CLEAR",
        ALLOW_PRINT_CLEAR_ACK => "ALLOW_PRINT_CLEAR_ACK",
        SET_LABEL_DENSITY => "SET_LABEL_DENSITY",
        SET_LABEL_DENSITY_ACK => "SET_LABEL_DENSITY_ACK",
        SET_LABEL_TYPE => "SET_LABEL_TYPE",
        SET_LABEL_TYPE_ACK => "SET_LABEL_TYPE_ACK",
        GET_INFO => "GET_INFO",
        GET_PRINT_STATUS => "GET_PRINT_STATUS",
        PRINT_STATUS => "PRINT_STATUS",
        HEARTBEAT => "HEARTBEAT",
        HEARTBEAT_REPLY => "HEARTBEAT_REPLY",
        END_PAGE_PRINT => "END_PAGE_PRINT",
        END_PAGE_PRINT_ACK => "END_PAGE_PRINT_ACK",
        END_PRINT => "END_PRINT",
        END_PRINT_ACK => "END_PRINT_ACK",
        code if InfoKey::from_response_code(code).is_some() => "INFO",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;

    #[test]
    fn start_print_matches_reference_frame() {
        let wire = start_print().to_frame();
        assert_eq!(wire, encode(0x01, &[0x01]).unwrap());
    }

    #[test]
    fn info_keys_roundtrip_through_response_codes() {
        for key in InfoKey::ALL {
            assert_eq!(InfoKey::from_response_code(key.response_code()), Some(key));
        }
        assert_eq!(InfoKey::DeviceType.response_code(), 0x48);
        assert_eq!(InfoKey::from_response_code(0x3F), None);
        assert_eq!(InfoKey::from_response_code(0x44), None);
    }

    #[test]
    fn dimension_is_big_endian() {
        let packet = set_dimension(240, 384);
        assert_eq!(packet.command(), SET_DIMENSION);
        assert_eq!(packet.payload().as_ref(), &[0x00, 0xF0, 0x01, 0x80]);
    }

    #[test]
    fn quantity_is_big_endian() {
        assert_eq!(set_quantity(258).payload().as_ref(), &[0x01, 0x02]);
    }

    #[test]
    fn names_cover_requests_responses_and_info() {
        assert_eq!(command_name(START_PRINT), "START_PRINT");
        assert_eq!(command_name(ALLOW_PRINT_CLEAR_ACK), "ALLOW_PRINT_CLEAR_ACK");
        assert_eq!(command_name(0x48), "INFO");
        assert_eq!(command_name(0x77), "UNKNOWN");
    }

    #[test]
    fn ack_codes_follow_printer_convention() {
        assert_eq!(START_PRINT_ACK, 0x02);
        assert_eq!(ALLOW_PRINT_CLEAR_ACK, 0x30);
        assert_eq!(SET_LABEL_DENSITY_ACK, 0x31);
        assert_eq!(SET_LABEL_TYPE_ACK, 0x33);
        assert_eq!(PRINT_STATUS, 0xB3);
        assert_eq!(HEARTBEAT_REPLY, 0xDD);
        assert_eq!(END_PRINT_ACK, 0xF4);
    }
}
