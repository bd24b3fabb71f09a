//! Builder for panel-side frames.
//!
//! Used by the `send` emulator command, tests and benchmarks to produce
//! frames exactly as a panel would transmit them.

use crate::cipher::encrypt_hex;
use crate::frame::build_frame;
use chrono::NaiveDateTime;
use siaip_core::Result;
use siaip_core::constants::{AES_BLOCK_SIZE, DATA_END, DATA_MARKER, PANEL_TIMESTAMP_FORMAT};

/// Default transmission type tag.
pub const DEFAULT_MESSAGE_TYPE: &str = "*SIA-DCS";

/// Character used to left-pad the plaintext to a whole number of blocks.
const PAD_CHAR: u8 = b'0';

/// Builder for an encrypted panel frame.
///
/// # Example
///
/// ```
/// use siaip_protocol::{PanelFrame, cipher::decrypt_hex, frame::InboundFrame};
///
/// let key = b"0123456789abcdef";
/// let wire = PanelFrame::new("1234").sequence("0042").signal("NBA012").encode(key).unwrap();
///
/// let frame = InboundFrame::parse(&wire).unwrap();
/// assert_eq!(frame.id_block().account, "1234");
/// assert!(decrypt_hex(frame.ciphertext(), key).unwrap().ends_with("|NBA012]"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelFrame {
    message_type: String,
    sequence: String,
    receiver: String,
    line: String,
    account: String,
    signal: String,
    timestamp: Option<NaiveDateTime>,
}

impl PanelFrame {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            message_type: DEFAULT_MESSAGE_TYPE.to_string(),
            sequence: "0001".to_string(),
            receiver: "0".to_string(),
            line: "0".to_string(),
            account: account.into(),
            signal: String::new(),
            timestamp: None,
        }
    }

    pub fn message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    pub fn sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = sequence.into();
        self
    }

    pub fn receiver(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = receiver.into();
        self
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.line = line.into();
        self
    }

    /// Relevant-data segment, e.g. `NBA012`.
    pub fn signal(mut self, signal: impl Into<String>) -> Self {
        self.signal = signal.into();
        self
    }

    /// Panel clock reading, formatted as `_HH:MM:SS,MM-DD-YYYY`.
    pub fn timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Plaintext before encryption, left-padded to a block multiple.
    pub fn plaintext(&self) -> String {
        let mut data = format!("{DATA_MARKER}{}{DATA_END}", self.signal);
        if let Some(timestamp) = self.timestamp {
            data.push_str(&timestamp.format(PANEL_TIMESTAMP_FORMAT).to_string());
        }

        let pad = (AES_BLOCK_SIZE - data.len() % AES_BLOCK_SIZE) % AES_BLOCK_SIZE;
        let mut padded = String::with_capacity(pad + data.len());
        padded.extend(std::iter::repeat_n(PAD_CHAR as char, pad));
        padded.push_str(&data);
        padded
    }

    /// Frame body (everything between the size field and `\r`).
    ///
    /// # Errors
    /// Returns `Error::UnsupportedKey` if `key` is not 16, 24 or 32 bytes.
    pub fn body(&self, key: &[u8]) -> Result<String> {
        let ciphertext = encrypt_hex(self.plaintext().as_bytes(), key)?;
        Ok(format!(
            "\"{}\"{}R{}L{}#{}[{ciphertext}",
            self.message_type, self.sequence, self.receiver, self.line, self.account
        ))
    }

    /// Complete wire frame, `\n` through `\r`.
    ///
    /// # Errors
    /// Same as [`PanelFrame::body`].
    pub fn encode(&self, key: &[u8]) -> Result<String> {
        Ok(build_frame(&self.body(key)?))
    }
}
