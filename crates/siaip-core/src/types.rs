use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Alarm signal decoded from the relevant-data segment.
///
/// `address` is only populated when the catalog marks `code` as a zone code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub code: Option<String>,
    pub address: Option<i64>,
}

impl Signal {
    /// A signal block with no usable data.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.code, self.address) {
            (Some(code), Some(address)) => write!(f, "{code}{address}"),
            (Some(code), None) => write!(f, "{code}"),
            (None, _) => write!(f, "-"),
        }
    }
}

/// Panel and receiver timestamps with their reconciled drift.
///
/// Both instants are truncated to whole seconds; `drift_seconds` is
/// `panel - received`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub panel: DateTime<Utc>,
    pub received: DateTime<Utc>,
    pub drift_seconds: i64,
}

impl Timestamps {
    /// Timestamps for a payload that carried no usable panel time.
    #[must_use]
    pub fn received_only(received: DateTime<Utc>) -> Self {
        Self {
            panel: received,
            received,
            drift_seconds: 0,
        }
    }

    /// Panel time as epoch seconds.
    #[must_use]
    pub fn panel_epoch(&self) -> i64 {
        self.panel.timestamp()
    }

    /// Receipt time as epoch seconds.
    #[must_use]
    pub fn received_epoch(&self) -> i64 {
        self.received.timestamp()
    }
}

/// The central value produced by decoding one inbound frame.
///
/// Built once per frame and never mutated afterwards; sinks receive it
/// behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Decrypted plaintext of the ciphertext block.
    pub raw_payload: String,
    /// Quoted transmission type tag, without the quotes.
    pub message_type: String,
    /// Installation identifier from the id block.
    pub account: String,
    /// Sequence number, echoed in the ACK.
    pub sequence: String,
    /// Line prefix (`L...`), echoed in the ACK.
    pub prefix: String,
    pub signal: Signal,
    pub timestamps: Timestamps,
}

impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} #{} seq={} signal={} drift={}s",
            self.message_type, self.account, self.sequence, self.signal, self.timestamps.drift_seconds
        )
    }
}

/// Outcome of the drift check: acknowledge or reject the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Accept,
    Reject,
}

impl Verdict {
    /// Returns `true` if the frame is acknowledged.
    #[inline]
    #[must_use]
    pub fn is_accept(self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Verdict::Accept => write!(f, "ACK"),
            Verdict::Reject => write!(f, "NAK"),
        }
    }
}
