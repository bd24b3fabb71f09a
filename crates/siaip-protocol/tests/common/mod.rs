//! Common test utilities for protocol integration tests.
//!
//! Frames are produced with [`PanelFrame`] exactly as a panel would send
//! them, then fed through the receiver side. All clocks are pinned to UTC so
//! the tests do not depend on the host time zone.
#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use siaip_core::{Blacklist, CodeCatalog, CodeCategory, DriftWindow, Verdict};
use siaip_protocol::{FrameProcessor, LocalZone, PanelFrame, Processed, TimestampReconciler};
use std::sync::Arc;

/// 16-byte key, selects AES-128-CBC.
pub const KEY_128: &[u8] = b"0123456789abcdef";

/// 24-byte key, selects AES-192-CBC.
pub const KEY_192: &[u8] = b"0123456789abcdef01234567";

/// 32-byte key, selects AES-256-CBC.
pub const KEY_256: &[u8] = b"0123456789abcdef0123456789abcdef";

/// Account present in the test blacklist.
pub const BLACKLISTED: &str = "9999";

/// Fixed receipt instant used across tests.
pub fn received() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 25, 14, 12, 4).unwrap()
}

pub fn catalog() -> Arc<CodeCatalog> {
    Arc::new(CodeCatalog::new([
        ("BA", CodeCategory::Zone),
        ("FA", CodeCategory::Zone),
        ("OP", CodeCategory::Other("user".to_string())),
    ]))
}

/// Processor with a UTC "local" zone and the default drift window.
pub fn processor(key: &[u8]) -> FrameProcessor {
    processor_with_offset(key, 0)
}

/// Processor whose local zone is `offset_hours` east of UTC.
pub fn processor_with_offset(key: &[u8], offset_hours: i32) -> FrameProcessor {
    let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap();
    FrameProcessor::new(
        key,
        catalog(),
        Arc::new([BLACKLISTED].into_iter().collect::<Blacklist>()),
        TimestampReconciler::new(LocalZone::Fixed(offset), DriftWindow::default()),
    )
}

/// Encrypted panel chunk carrying `signal` and a panel clock of `panel`.
pub fn panel_chunk(key: &[u8], account: &str, signal: &str, panel: DateTime<Utc>) -> Vec<u8> {
    PanelFrame::new(account)
        .sequence("0001")
        .signal(signal)
        .timestamp(panel.naive_utc())
        .encode(key)
        .unwrap()
        .into_bytes()
}

/// Assert an ACK echoing the given id fields.
pub fn assert_ack(processed: &Processed, sequence: &str, prefix: &str, account: &str) {
    assert_eq!(processed.verdict, Verdict::Accept);
    assert!(processed.response.is_ack());
    assert_eq!(
        processed.response.body(),
        format!("\"ACK\"{sequence}{prefix}{account}[]")
    );
}

/// Assert a NAK carrying the receiver time of [`received`].
pub fn assert_nak(processed: &Processed) {
    assert_eq!(processed.verdict, Verdict::Reject);
    assert!(processed.response.is_nak());
    assert_eq!(
        processed.response.body(),
        "\"NAK\"0000R0L0[]_14:12:04,09-25-2024"
    );
}
