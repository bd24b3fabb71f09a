//! Field extraction from a decrypted payload.
//!
//! A decrypted payload looks like `<padding>|<signal>]_HH:MM:SS,MM-DD-YYYY`.
//! The signal segment is `<N><code><address>[^...]`, optionally preceded by
//! a 3-character noise prefix.

use crate::frame::InboundFrame;
use siaip_core::constants::{
    ADDRESS_END, DATA_END, DATA_MARKER, NOISE_PREFIX, SIGNAL_CODE_LEN, TIMESTAMP_MARKER,
};
use siaip_core::{CodeCatalog, DecodedEvent, Signal, Timestamps};
use std::sync::Arc;

/// Relevant-data segment: text between the last `|` and the last `]`.
///
/// Returns `None` if there is no `|`, no `]` after it, or the segment is empty.
///
/// # Examples
///
/// ```
/// use siaip_protocol::decoder::relevant_data;
///
/// assert_eq!(relevant_data("0000|NBA012]_14:12:04,09-25-2024"), Some("NBA012"));
/// assert_eq!(relevant_data("no segment here"), None);
/// ```
pub fn relevant_data(payload: &str) -> Option<&str> {
    let start = payload.rfind(DATA_MARKER)? + DATA_MARKER.len_utf8();
    let end = payload.rfind(DATA_END)?;
    let segment = payload.get(start..end)?;
    (!segment.is_empty()).then_some(segment)
}

/// Panel timestamp text: from the last `_` to the end of the payload.
pub fn panel_timestamp_text(payload: &str) -> Option<&str> {
    payload.rfind(TIMESTAMP_MARKER).map(|pos| &payload[pos..])
}

/// Turns decrypted payloads into [`DecodedEvent`]s.
///
/// Holds the code catalog, which decides whether a code carries a zone
/// address.
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    catalog: Arc<CodeCatalog>,
}

impl MessageDecoder {
    pub fn new(catalog: Arc<CodeCatalog>) -> Self {
        Self { catalog }
    }

    /// Decode the signal from a decrypted payload.
    ///
    /// Missing segments and codes shorter than two characters give null
    /// fields, never an error. The address is only read for zone codes and a
    /// non-numeric address is null.
    pub fn decode_signal(&self, payload: &str) -> Signal {
        let Some(segment) = relevant_data(payload) else {
            return Signal::empty();
        };
        let segment = segment.strip_prefix(NOISE_PREFIX).unwrap_or(segment);

        let code: String = segment.chars().skip(1).take(SIGNAL_CODE_LEN).collect();
        if code.chars().count() < SIGNAL_CODE_LEN {
            return Signal::empty();
        }

        let address = if self.catalog.is_zone(&code) {
            let tail: String = segment
                .chars()
                .skip(1 + SIGNAL_CODE_LEN)
                .take_while(|&c| c != ADDRESS_END)
                .collect();
            tail.trim().parse::<i64>().ok()
        } else {
            None
        };

        Signal {
            code: Some(code),
            address,
        }
    }

    /// Assemble the event for one frame.
    pub fn decode(
        &self,
        frame: &InboundFrame<'_>,
        payload: String,
        timestamps: Timestamps,
    ) -> DecodedEvent {
        let signal = self.decode_signal(&payload);
        let id = frame.id_block();

        DecodedEvent {
            message_type: frame.message_type().to_string(),
            account: id.account.to_string(),
            sequence: id.sequence.to_string(),
            prefix: id.prefix.to_string(),
            signal,
            timestamps,
            raw_payload: payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use siaip_core::CodeCategory;

    fn decoder() -> MessageDecoder {
        MessageDecoder::new(Arc::new(CodeCatalog::new([
            ("BA", CodeCategory::Zone),
            ("G1", CodeCategory::Zone),
            ("OP", CodeCategory::Other("user".to_string())),
        ])))
    }

    #[rstest]
    #[case("0000|NBA012]_14:12:04,09-25-2024", Some("BA"), Some(12))]
    #[case("0000|NBA012^ZONE 12^]_14:12:04,09-25-2024", Some("BA"), Some(12))]
    #[case("|Nri0G17]_14:12:04,09-25-2024", Some("G1"), Some(7))]
    #[case("00|NOP0042]_14:12:04,09-25-2024", Some("OP"), None)]
    #[case("00|NRP]", Some("RP"), None)]
    #[case("00|NBAxyz]", Some("BA"), None)]
    #[case("00|NBA]", Some("BA"), None)]
    #[case("00|NR]", None, None)]
    #[case("00|N]", None, None)]
    #[case("00|]_14:12:04,09-25-2024", None, None)]
    #[case("0000NBA012_14:12:04,09-25-2024", None, None)]
    #[case("0000|NBA012_14:12:04,09-25-2024", None, None)]
    fn test_decode_signal(
        #[case] payload: &str,
        #[case] code: Option<&str>,
        #[case] address: Option<i64>,
    ) {
        let signal = decoder().decode_signal(payload);
        assert_eq!(signal.code.as_deref(), code);
        assert_eq!(signal.address, address);
    }

    #[test]
    fn test_relevant_data_uses_last_delimiters() {
        assert_eq!(relevant_data("a|b|NBA1]x]_ts"), Some("NBA1]x"));
    }

    #[test]
    fn test_relevant_data_end_before_start() {
        assert_eq!(relevant_data("]NBA1|"), None);
    }

    #[rstest]
    #[case("0000|NBA012]_14:12:04,09-25-2024", Some("_14:12:04,09-25-2024"))]
    #[case("0000|NBA012]", None)]
    fn test_panel_timestamp_text(#[case] payload: &str, #[case] expected: Option<&str>) {
        assert_eq!(panel_timestamp_text(payload), expected);
    }

    #[test]
    fn test_decode_event_fields() {
        let raw = "\n00000000\"*SIA-DCS\"0007R1L2#ABCD[00FF\r";
        let frame = InboundFrame::parse(raw).unwrap();
        let received = Utc.with_ymd_and_hms(2024, 9, 25, 14, 12, 4).unwrap();

        let event = decoder().decode(
            &frame,
            "0000|NBA012]_14:12:04,09-25-2024".to_string(),
            Timestamps::received_only(received),
        );

        assert_eq!(event.message_type, "*SIA-DCS");
        assert_eq!(event.account, "ABCD");
        assert_eq!(event.sequence, "0007");
        assert_eq!(event.prefix, "L2");
        assert_eq!(event.signal.code.as_deref(), Some("BA"));
        assert_eq!(event.signal.address, Some(12));
        assert_eq!(event.raw_payload, "0000|NBA012]_14:12:04,09-25-2024");
    }
}
