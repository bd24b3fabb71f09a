//! Wire envelope of SIA-IP frames.
//!
//! Inbound frames are split into their ciphertext block and plaintext
//! suffix (`"<type>"<id block>`). Replies are built and parsed as
//! [`ResponseFrame`]s, whose CRC and size fields cover the body only.

use crate::crc::{checksum, format_checksum, format_size, parse_checksum, parse_size};
use bytes::{BufMut, Bytes, BytesMut};
use siaip_core::{Error, Result, constants::*};
use std::fmt;

/// Wrap `body` in the wire envelope: `\n` + CRC + size + body + `\r`.
///
/// CRC and size cover the body only.
///
/// # Examples
///
/// ```
/// use siaip_protocol::frame::build_frame;
///
/// let wire = build_frame("\"ACK\"0001L01234[]");
/// assert!(wire.starts_with('\n'));
/// assert!(wire.ends_with('\r'));
/// assert_eq!(&wire[5..9], "0011");
/// ```
#[must_use]
pub fn build_frame(body: &str) -> String {
    let mut wire = String::with_capacity(body.len() + FRAME_OVERHEAD);
    wire.push(FRAME_START as char);
    wire.push_str(&format_checksum(checksum(body.as_bytes())));
    wire.push_str(&format_size(body.as_bytes()));
    wire.push_str(body);
    wire.push(FRAME_END as char);
    wire
}

/// Hex ciphertext of a raw chunk: everything after the first `[`.
///
/// Trailing non-hex characters (the `\r` terminator, stray brackets or
/// whitespace) are trimmed.
///
/// # Errors
/// Returns `Error::MalformedFrame` if there is no `[` or nothing follows it.
pub fn locate_ciphertext(raw: &str) -> Result<&str> {
    let start = raw
        .find(CIPHERTEXT_OPEN)
        .ok_or_else(|| Error::MalformedFrame("missing ciphertext delimiter '['".to_string()))?;

    let hex = raw[start + 1..].trim_end_matches(|c: char| !c.is_ascii_hexdigit());
    if hex.is_empty() {
        return Err(Error::MalformedFrame("empty ciphertext block".to_string()));
    }
    Ok(hex)
}

/// Plaintext suffix of a raw chunk: from the first `"` up to the last `\r`.
///
/// A chunk without terminator yields the suffix up to the end of input.
///
/// # Errors
/// Returns `Error::MalformedFrame` if there is no `"`.
pub fn locate_plaintext_suffix(raw: &str) -> Result<&str> {
    let start = raw
        .find(QUOTE)
        .ok_or_else(|| Error::MalformedFrame("missing message type quote".to_string()))?;

    let rest = &raw[start..];
    Ok(match rest.rfind(FRAME_END as char) {
        Some(end) => &rest[..end],
        None => rest,
    })
}

/// One inbound chunk split into its encrypted and plaintext regions.
///
/// Parsing is positional over the delimiters; no fixed offsets are assumed
/// and the inbound CRC/size fields are not verified.
#[derive(Debug, Clone, Copy)]
pub struct InboundFrame<'a> {
    ciphertext: &'a str,
    message_type: &'a str,
    id_block: IdBlock<'a>,
}

impl<'a> InboundFrame<'a> {
    /// Locate the regions of `raw`.
    ///
    /// # Errors
    /// Returns `Error::MalformedFrame` if any delimiter is missing.
    pub fn parse(raw: &'a str) -> Result<Self> {
        let ciphertext = locate_ciphertext(raw)?;
        let suffix = locate_plaintext_suffix(raw)?;

        let last_quote = suffix.rfind(QUOTE).unwrap_or(0);
        if last_quote == 0 {
            return Err(Error::MalformedFrame(
                "message type is not closed by a quote".to_string(),
            ));
        }
        let message_type = &suffix[1..last_quote];

        let after_type = &suffix[last_quote + 1..];
        let id_end = after_type.rfind(CIPHERTEXT_OPEN).ok_or_else(|| {
            Error::MalformedFrame("id block is not followed by '['".to_string())
        })?;
        let id_block = IdBlock::parse(&after_type[..id_end])?;

        Ok(Self {
            ciphertext,
            message_type,
            id_block,
        })
    }

    pub fn ciphertext(&self) -> &'a str {
        self.ciphertext
    }

    pub fn message_type(&self) -> &'a str {
        self.message_type
    }

    pub fn id_block(&self) -> IdBlock<'a> {
        self.id_block
    }
}

/// Fields of the plaintext id block `<seq>R<rcv>L<line>#<account>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdBlock<'a> {
    pub sequence: &'a str,
    pub prefix: &'a str,
    pub account: &'a str,
}

impl<'a> IdBlock<'a> {
    /// Split an id block into sequence, line prefix and account.
    ///
    /// - `account`: after the last `#`
    /// - `prefix`: from the first `L` up to the `#`
    /// - `sequence`: before the first `R`, or before the first `L` without `R`
    ///
    /// # Errors
    /// Returns `Error::MalformedFrame` if there is no `#` or the account is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use siaip_protocol::frame::IdBlock;
    ///
    /// let id = IdBlock::parse("0001R1L0#1234").unwrap();
    /// assert_eq!(id.sequence, "0001");
    /// assert_eq!(id.prefix, "L0");
    /// assert_eq!(id.account, "1234");
    /// ```
    pub fn parse(id: &'a str) -> Result<Self> {
        let hash = id
            .rfind(ACCOUNT_MARKER)
            .ok_or_else(|| Error::MalformedFrame(format!("missing account marker in '{id}'")))?;

        let account = &id[hash + 1..];
        if account.is_empty() {
            return Err(Error::MalformedFrame(format!("empty account in '{id}'")));
        }

        let head = &id[..hash];
        let line = head.find(LINE_MARKER);
        let prefix = line.map_or("", |l| &head[l..]);
        let sequence = match head.find(RECEIVER_MARKER).or(line) {
            Some(end) => &head[..end],
            None => "",
        };

        Ok(Self {
            sequence,
            prefix,
            account,
        })
    }
}

/// Reply written back to the panel.
///
/// ```text
/// \n<CRC><SIZE>"ACK"<seq><prefix><account>[]\r
/// \n<CRC><SIZE>"NAK"0000R0L0[]_HH:mm:ss,MM-DD-YYYY\r
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    crc: u16,
    size: u16,
    body: String,
}

impl ResponseFrame {
    /// Build a reply around `body`, computing CRC and size.
    pub fn from_body(body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            crc: checksum(body.as_bytes()),
            size: u16::try_from(body.len()).unwrap_or(u16::MAX),
            body,
        }
    }

    /// Positive acknowledgment echoing the frame's id fields.
    ///
    /// # Examples
    ///
    /// ```
    /// use siaip_protocol::ResponseFrame;
    ///
    /// let ack = ResponseFrame::ack("0001", "L0", "1234");
    /// assert_eq!(ack.body(), "\"ACK\"0001L01234[]");
    /// assert_eq!(ack.size_hex(), "0011");
    /// ```
    pub fn ack(sequence: &str, prefix: &str, account: &str) -> Self {
        Self::from_body(format!("{ACK_TAG}{sequence}{prefix}{account}{EMPTY_BLOCK}"))
    }

    /// Negative acknowledgment carrying the receiver's time, already
    /// formatted as `_HH:mm:ss,MM-DD-YYYY`.
    pub fn nak(receiver_time: &str) -> Self {
        Self::from_body(format!("{NAK_PREFIX}{receiver_time}"))
    }

    /// Parse and verify a reply as written on the wire.
    ///
    /// # Errors
    /// Returns `Error::MalformedFrame` if the envelope is incomplete and
    /// `Error::ChecksumMismatch` if CRC or size do not match the body.
    pub fn parse(wire: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(wire)
            .map_err(|e| Error::MalformedFrame(format!("Invalid UTF-8: {e}")))?;
        let text = text
            .strip_prefix(FRAME_START as char)
            .unwrap_or(text)
            .trim_end_matches(FRAME_END as char);

        if text.len() < HEX_FIELD_WIDTH * 2 || !text.is_char_boundary(HEX_FIELD_WIDTH * 2) {
            return Err(Error::MalformedFrame(format!("reply too short: '{text}'")));
        }
        let (crc_field, rest) = text.split_at(HEX_FIELD_WIDTH);
        let (size_field, body) = rest.split_at(HEX_FIELD_WIDTH);

        let declared_crc = parse_checksum(crc_field)?;
        let declared_size = parse_size(size_field)?;
        let frame = Self::from_body(body);

        if frame.crc != declared_crc {
            return Err(Error::ChecksumMismatch {
                expected: frame.crc_hex(),
                actual: crc_field.to_string(),
            });
        }
        if frame.size != declared_size {
            return Err(Error::MalformedFrame(format!(
                "declared size {declared_size} does not match body length {}",
                frame.size
            )));
        }
        Ok(frame)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn crc(&self) -> u16 {
        self.crc
    }

    pub fn crc_hex(&self) -> String {
        format_checksum(self.crc)
    }

    pub fn size_hex(&self) -> String {
        format!("{:04X}", self.size)
    }

    pub fn is_ack(&self) -> bool {
        self.body.starts_with(ACK_TAG)
    }

    pub fn is_nak(&self) -> bool {
        self.body.starts_with(NAK_PREFIX)
    }

    /// Wire bytes of the reply.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.body.len() + FRAME_OVERHEAD);
        buf.put_u8(FRAME_START);
        buf.put_slice(self.crc_hex().as_bytes());
        buf.put_slice(self.size_hex().as_bytes());
        buf.put_slice(self.body.as_bytes());
        buf.put_u8(FRAME_END);
        buf.freeze()
    }
}

impl fmt::Display for ResponseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reply[crc={}, size={}, body='{}']",
            self.crc_hex(),
            self.size_hex(),
            self.body
        )
    }
}
