//! CRC-16/ARC checksum and the 4-digit hex fields of the frame envelope.
//!
//! Parameters: polynomial 0x8005 (reflected 0xA001), initial value 0,
//! reflected input and output, no final XOR. The lookup table is built at
//! compile time and is identical to the classic 256-entry ARC table
//! (`0x0000, 0xC0C1, 0xC181, 0x0140, ...`).

use siaip_core::constants::HEX_FIELD_WIDTH;
use siaip_core::{Error, Result};

/// Reflected form of the 0x8005 polynomial.
const POLY_REFLECTED: u16 = 0xA001;

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLY_REFLECTED
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC16_TABLE: [u16; 256] = build_table();

/// Compute the CRC-16/ARC checksum of `data`.
///
/// # Examples
///
/// ```
/// use siaip_protocol::crc::checksum;
///
/// assert_eq!(checksum(b"123456789"), 0xBB3D);
/// assert_eq!(checksum(b""), 0x0000);
/// ```
#[must_use]
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        (crc >> 8) ^ CRC16_TABLE[usize::from((crc ^ u16::from(byte)) as u8)]
    })
}

/// Format a checksum as 4 uppercase hex digits, zero-padded.
#[must_use]
pub fn format_checksum(value: u16) -> String {
    format!("{value:04X}")
}

/// Parse a 4-digit hex checksum field.
///
/// # Errors
/// Returns `Error::MalformedFrame` if `field` is not exactly four hex digits.
pub fn parse_checksum(field: &str) -> Result<u16> {
    parse_hex_field(field, "checksum")
}

/// Format the byte length of `payload` as 4 uppercase hex digits, zero-padded.
///
/// Lengths above `0xFFFF` do not fit the field and are rendered in full;
/// such bodies never occur in practice because frames are capped well below.
#[must_use]
pub fn format_size(payload: &[u8]) -> String {
    format!("{:04X}", payload.len())
}

/// Parse a 4-digit hex size field.
///
/// # Errors
/// Returns `Error::MalformedFrame` if `field` is not exactly four hex digits.
pub fn parse_size(field: &str) -> Result<u16> {
    parse_hex_field(field, "size")
}

fn parse_hex_field(field: &str, name: &str) -> Result<u16> {
    if field.len() != HEX_FIELD_WIDTH || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::MalformedFrame(format!(
            "Invalid {name} field '{field}'"
        )));
    }
    u16::from_str_radix(field, 16)
        .map_err(|e| Error::MalformedFrame(format!("Invalid {name} field '{field}': {e}")))
}
