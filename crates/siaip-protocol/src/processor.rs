//! One inbound chunk in, one verdict and reply out.
//!
//! ```text
//! chunk -> InboundFrame -> decrypt -> reconcile timestamps
//!       -> blacklist -> decode signal -> verdict -> ACK / NAK
//! ```

use crate::cipher::decrypt_hex;
use crate::decoder::{MessageDecoder, panel_timestamp_text};
use crate::frame::{InboundFrame, ResponseFrame};
use crate::timestamp::TimestampReconciler;
use chrono::{DateTime, Utc};
use siaip_core::{Blacklist, CodeCatalog, DecodedEvent, Error, Result, ServerSettings, Verdict};
use std::sync::Arc;
use tracing::debug;

/// Result of processing one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub event: DecodedEvent,
    pub verdict: Verdict,
    pub response: ResponseFrame,
}

/// Stateless per-chunk pipeline shared by all connections.
#[derive(Debug, Clone)]
pub struct FrameProcessor {
    key: Vec<u8>,
    decoder: MessageDecoder,
    reconciler: TimestampReconciler,
    blacklist: Arc<Blacklist>,
}

impl FrameProcessor {
    pub fn new(
        key: impl Into<Vec<u8>>,
        catalog: Arc<CodeCatalog>,
        blacklist: Arc<Blacklist>,
        reconciler: TimestampReconciler,
    ) -> Self {
        Self {
            key: key.into(),
            decoder: MessageDecoder::new(catalog),
            reconciler,
            blacklist,
        }
    }

    /// Processor for the configured key, offset and drift window.
    pub fn from_settings(
        settings: &ServerSettings,
        catalog: Arc<CodeCatalog>,
        blacklist: Arc<Blacklist>,
    ) -> Self {
        Self::new(
            settings.key_bytes(),
            catalog,
            blacklist,
            TimestampReconciler::from_settings(settings),
        )
    }

    /// Process one `\r`-terminated chunk received at `received`.
    ///
    /// # Errors
    /// - `Error::MalformedFrame` if the chunk cannot be split into its regions
    /// - `Error::UnsupportedKey` / `Error::DecryptFailure` if decryption fails
    /// - `Error::RejectedAccount` if the account is blacklisted
    ///
    /// All of these are chunk-local: the caller sends no reply.
    pub fn process(&self, chunk: &[u8], received: DateTime<Utc>) -> Result<Processed> {
        let text = String::from_utf8_lossy(chunk);
        let frame = InboundFrame::parse(&text)?;

        let payload = decrypt_hex(frame.ciphertext(), &self.key)?;
        let timestamps = self
            .reconciler
            .reconcile(panel_timestamp_text(&payload), received);

        let id = frame.id_block();
        if self.blacklist.contains(id.account) {
            return Err(Error::RejectedAccount {
                account: id.account.to_string(),
            });
        }

        let event = self.decoder.decode(&frame, payload, timestamps);
        let verdict = self.reconciler.verdict(&event.timestamps);
        let response = match verdict {
            Verdict::Accept => ResponseFrame::ack(&event.sequence, &event.prefix, &event.account),
            Verdict::Reject => {
                ResponseFrame::nak(&self.reconciler.format_receiver_time(timestamps.received))
            }
        };

        debug!(%event, %verdict, "frame processed");
        Ok(Processed {
            event,
            verdict,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::PanelFrame;
    use crate::timestamp::LocalZone;
    use chrono::{Duration, FixedOffset, TimeZone};
    use siaip_core::{CodeCategory, DriftWindow};

    const KEY: &[u8] = b"0123456789abcdef";

    fn processor() -> FrameProcessor {
        let offset = FixedOffset::east_opt(0).unwrap();
        FrameProcessor::new(
            KEY,
            Arc::new(CodeCatalog::new([("BA", CodeCategory::Zone)])),
            Arc::new(["9999"].into_iter().collect()),
            TimestampReconciler::new(LocalZone::Fixed(offset), DriftWindow::default()),
        )
    }

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 25, 14, 12, 4).unwrap()
    }

    fn chunk(account: &str, panel: DateTime<Utc>) -> Vec<u8> {
        PanelFrame::new(account)
            .sequence("0001")
            .signal("NBA012")
            .timestamp(panel.naive_utc())
            .encode(KEY)
            .unwrap()
            .into_bytes()
    }

    #[test]
    fn test_in_window_is_acknowledged() {
        let processed = processor().process(&chunk("1234", received()), received()).unwrap();

        assert_eq!(processed.verdict, Verdict::Accept);
        assert_eq!(processed.response.body(), "\"ACK\"0001L01234[]");
        assert_eq!(processed.event.account, "1234");
        assert_eq!(processed.event.signal.code.as_deref(), Some("BA"));
        assert_eq!(processed.event.signal.address, Some(12));
        assert_eq!(processed.event.timestamps.drift_seconds, 0);
    }

    #[test]
    fn test_out_of_window_is_rejected() {
        let panel = received() - Duration::minutes(10);
        let processed = processor().process(&chunk("1234", panel), received()).unwrap();

        assert_eq!(processed.verdict, Verdict::Reject);
        assert_eq!(processed.event.timestamps.drift_seconds, -600);
        assert_eq!(
            processed.response.body(),
            "\"NAK\"0000R0L0[]_14:12:04,09-25-2024"
        );
    }

    #[test]
    fn test_blacklisted_account() {
        let result = processor().process(&chunk("9999", received()), received());
        assert!(matches!(result, Err(Error::RejectedAccount { account }) if account == "9999"));
    }

    #[test]
    fn test_malformed_chunk() {
        let result = processor().process(b"\nnot a frame\r", received());
        assert!(matches!(result, Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_wrong_key_length() {
        let processor = FrameProcessor::new(
            b"short".as_slice(),
            Arc::new(CodeCatalog::default()),
            Arc::new(Blacklist::default()),
            TimestampReconciler::new(LocalZone::System, DriftWindow::default()),
        );
        let result = processor.process(&chunk("1234", received()), received());
        assert!(matches!(result, Err(Error::UnsupportedKey { length: 5 })));
    }

    #[test]
    fn test_bad_ciphertext() {
        let result = processor().process(b"\n00000000\"*SIA-DCS\"0001R0L0#1234[ABC\r", received());
        assert!(matches!(result, Err(Error::DecryptFailure(_))));
    }
}
