//! Core constants for the SIA-IP receiver protocol implementation.
//!
//! This module defines the protocol-level constants used throughout the
//! receiver. Panels in the field are strict about byte layout, so every
//! delimiter, template and threshold lives here instead of being scattered
//! through the parsing code.
//!
//! # Protocol Structure
//!
//! An inbound frame looks like:
//!
//! ```text
//! <LF><CRC><LEN>"<TYPE>"<SEQ>R<RCV>L<LINE>#<ACCOUNT>[<HEX CIPHERTEXT><CR>
//! ```
//!
//! Where:
//! - `<LF>` - Line feed (0x0A), start of frame
//! - `CRC` - 4 uppercase hex digits, CRC-16/ARC of the body
//! - `LEN` - 4 uppercase hex digits, body length in bytes
//! - `"TYPE"` - Quoted transmission type tag (e.g. `"*SIA-DCS"`)
//! - `SEQ`, `R`, `L`, `#` - Id block: sequence, receiver, line prefix, account
//! - `[` - Opens the encrypted block (hex-encoded AES-CBC ciphertext)
//! - `<CR>` - Carriage return (0x0D), end of frame
//!
//! The decrypted block has the shape `<pad>|<signal>]_<HH:mm:ss,MM-DD-YYYY>`.
//!
//! # Delimiter Semantics
//!
//! | Delimiter | Name | Purpose |
//! |-----------|------|---------|
//! | `[` | CIPHERTEXT_OPEN | Starts the hex ciphertext; the id block ends here |
//! | `"` | QUOTE | Wraps the message type tag |
//! | `#` | ACCOUNT_MARKER | Account id follows |
//! | `R` | RECEIVER_MARKER | Ends the sequence number |
//! | `L` | LINE_MARKER | Starts the line prefix |
//! | `\|` | DATA_MARKER | Starts the relevant-data (signal) segment |
//! | `]` | DATA_END | Ends the signal segment |
//! | `^` | ADDRESS_END | Ends a zone address inside the signal segment |
//! | `_` | TIMESTAMP_MARKER | Starts the panel timestamp |
//!
//! # Protocol Compliance
//!
//! The zero IV and disabled padding are requirements of the panel firmware.
//! Modifying these values breaks interoperability with deployed panels.

// ============================================================================
// Message Framing
// ============================================================================

/// Start of frame marker (LF).
pub const FRAME_START: u8 = b'\n';

/// End of frame marker (CR).
///
/// Inbound chunks are split on this byte; replies are terminated with it.
pub const FRAME_END: u8 = b'\r';

/// Bytes added by the envelope around a body: LF + CRC(4) + LEN(4) + CR.
pub const FRAME_OVERHEAD: usize = 10;

/// Width of the hex CRC and size fields.
pub const HEX_FIELD_WIDTH: usize = 4;

/// Default maximum size of one inbound chunk (64 KB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

// ============================================================================
// Delimiters
// ============================================================================

/// Opens the hex ciphertext block; also closes the id block.
pub const CIPHERTEXT_OPEN: char = '[';

/// Wraps the message type tag.
pub const QUOTE: char = '"';

/// Precedes the account id in the id block.
///
/// # Examples
///
/// ```
/// use siaip_core::constants::ACCOUNT_MARKER;
///
/// let id = "0001R1L0#1234";
/// let account = &id[id.rfind(ACCOUNT_MARKER).unwrap() + 1..];
/// assert_eq!(account, "1234");
/// ```
pub const ACCOUNT_MARKER: char = '#';

/// Ends the sequence number when present.
pub const RECEIVER_MARKER: char = 'R';

/// Starts the line prefix.
pub const LINE_MARKER: char = 'L';

/// Starts the relevant-data segment inside the decrypted payload.
pub const DATA_MARKER: char = '|';

/// Ends the relevant-data segment inside the decrypted payload.
pub const DATA_END: char = ']';

/// Ends a zone address inside the relevant-data segment.
pub const ADDRESS_END: char = '^';

/// Starts the panel timestamp inside the decrypted payload.
pub const TIMESTAMP_MARKER: char = '_';

/// Noise prefix some panels emit in front of the signal segment.
///
/// Observed as `Nri<n>` where the classic form is a bare `N`. Stripping the
/// three characters realigns the segment with the classic layout.
pub const NOISE_PREFIX: &str = "Nri";

/// Length of a signal code.
pub const SIGNAL_CODE_LEN: usize = 2;

// ============================================================================
// Timestamps
// ============================================================================

/// chrono format of the panel timestamp, `_HH:mm:ss,MM-DD-YYYY`.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDateTime;
/// use siaip_core::constants::PANEL_TIMESTAMP_FORMAT;
///
/// let ts = NaiveDateTime::parse_from_str("_14:12:04,09-25-2024", PANEL_TIMESTAMP_FORMAT).unwrap();
/// assert_eq!(ts.to_string(), "2024-09-25 14:12:04");
/// ```
pub const PANEL_TIMESTAMP_FORMAT: &str = "_%H:%M:%S,%m-%d-%Y";

/// Lower bound (exclusive) of the drift band treated as UTC/local confusion.
pub const TZ_SKEW_MIN_SECS: i64 = 6900;

/// Upper bound (exclusive) of the drift band treated as UTC/local confusion.
pub const TZ_SKEW_MAX_SECS: i64 = 7500;

/// Default negative drift bound in seconds (panel behind the receiver).
pub const DEFAULT_DRIFT_NEGATIVE: i64 = -20;

/// Default positive drift bound in seconds (panel ahead of the receiver).
pub const DEFAULT_DRIFT_POSITIVE: i64 = 40;

// ============================================================================
// Replies
// ============================================================================

/// Quoted tag of a positive acknowledgment.
pub const ACK_TAG: &str = "\"ACK\"";

/// Quoted tag and fixed id block of a negative acknowledgment.
///
/// The receiver's current time follows, formatted with
/// [`PANEL_TIMESTAMP_FORMAT`].
pub const NAK_PREFIX: &str = "\"NAK\"0000R0L0[]";

/// Empty data block closing an ACK body.
pub const EMPTY_BLOCK: &str = "[]";

// ============================================================================
// Cryptography
// ============================================================================

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// Initialization vector mandated by the panel firmware.
pub const ZERO_IV: [u8; AES_BLOCK_SIZE] = [0u8; AES_BLOCK_SIZE];

// ============================================================================
// Correlation
// ============================================================================

/// Characters kept from the end of an account for the fallback system lookup.
pub const SYSTEM_FALLBACK_LEN: usize = 4;

/// Signal-code length eligible for the system-id backfill.
pub const BACKFILL_SIGNAL_CODE_LEN: i64 = 2;

// ============================================================================
// Defaults
// ============================================================================

/// Default listening port.
pub const DEFAULT_PORT: u16 = 7000;

/// Default verbosity level.
pub const DEFAULT_VERBOSITY: u8 = 1;

/// Default maximum number of simultaneous panel connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Prefix of the derived instance (origin) tag; the port is appended.
pub const INSTANCE_TAG_PREFIX: &str = "SiaIP_";

/// `tracing` target of events printed by diagnostic sinks.
pub const DIAGNOSTIC_LOG_TARGET: &str = "siaip::diagnostic";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_overhead_matches_envelope() {
        // LF + CRC + LEN + CR
        assert_eq!(FRAME_OVERHEAD, 1 + HEX_FIELD_WIDTH * 2 + 1);
    }

    #[test]
    fn test_skew_band_is_ordered() {
        assert!(TZ_SKEW_MIN_SECS < TZ_SKEW_MAX_SECS);
        assert!(DEFAULT_DRIFT_NEGATIVE < 0);
        assert!(DEFAULT_DRIFT_POSITIVE > 0);
    }

    #[test]
    fn test_zero_iv_is_one_block() {
        assert_eq!(ZERO_IV.len(), AES_BLOCK_SIZE);
        assert!(ZERO_IV.iter().all(|&b| b == 0));
    }
}
