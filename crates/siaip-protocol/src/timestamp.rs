//! Panel/receiver timestamp reconciliation.
//!
//! Panels report their clock either in UTC or in local time without saying
//! which. The panel time is read as UTC first; when the resulting drift falls
//! in the 6900..7500 s band (about two hours ahead, the usual local offset of
//! the installations) it is read again as local time.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, SubsecRound, TimeZone, Utc};
use siaip_core::constants::{PANEL_TIMESTAMP_FORMAT, TZ_SKEW_MAX_SECS, TZ_SKEW_MIN_SECS};
use siaip_core::{DriftWindow, ServerSettings, Timestamps, Verdict};
use tracing::warn;

/// Zone used when a panel timestamp has to be read as local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalZone {
    /// The host's local zone.
    System,
    Fixed(FixedOffset),
}

impl LocalZone {
    fn to_utc(self, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            LocalZone::System => Local
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            LocalZone::Fixed(offset) => offset
                .from_local_datetime(naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    fn format(self, instant: DateTime<Utc>, fmt: &str) -> String {
        match self {
            LocalZone::System => instant.with_timezone(&Local).format(fmt).to_string(),
            LocalZone::Fixed(offset) => instant.with_timezone(&offset).format(fmt).to_string(),
        }
    }
}

/// Parse `_HH:MM:SS,MM-DD-YYYY`, ignoring trailing text.
///
/// # Examples
///
/// ```
/// use siaip_protocol::timestamp::parse_panel_time;
///
/// let parsed = parse_panel_time("_14:12:04,09-25-2024").unwrap();
/// assert_eq!(parsed.to_string(), "2024-09-25 14:12:04");
/// assert!(parse_panel_time("_garbage").is_none());
/// ```
pub fn parse_panel_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    NaiveDateTime::parse_and_remainder(text, PANEL_TIMESTAMP_FORMAT)
        .ok()
        .map(|(parsed, _)| parsed)
}

/// Computes [`Timestamps`] and the ACK/NAK verdict for each frame.
#[derive(Debug, Clone, Copy)]
pub struct TimestampReconciler {
    zone: LocalZone,
    window: DriftWindow,
}

impl TimestampReconciler {
    pub fn new(zone: LocalZone, window: DriftWindow) -> Self {
        Self { zone, window }
    }

    /// Reconciler using the configured fixed offset, or the host zone.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        let zone = match settings.utc_offset_minutes {
            None => LocalZone::System,
            Some(minutes) => match FixedOffset::east_opt(minutes.saturating_mul(60)) {
                Some(offset) => LocalZone::Fixed(offset),
                None => {
                    warn!(minutes, "UTC offset out of range, using host time zone");
                    LocalZone::System
                }
            },
        };
        Self::new(zone, settings.drift)
    }

    pub fn window(&self) -> DriftWindow {
        self.window
    }

    /// Reconcile the panel timestamp against the receipt time.
    ///
    /// Missing or unparseable panel text yields zero drift.
    pub fn reconcile(&self, panel_text: Option<&str>, received: DateTime<Utc>) -> Timestamps {
        let received = received.trunc_subsecs(0);
        let Some(naive) = panel_text.and_then(parse_panel_time) else {
            return Timestamps::received_only(received);
        };

        let mut panel = naive.and_utc();
        let drift = (panel - received).num_seconds();
        if drift > TZ_SKEW_MIN_SECS && drift < TZ_SKEW_MAX_SECS {
            if let Some(local) = self.zone.to_utc(&naive) {
                panel = local;
            }
        }

        Timestamps {
            panel,
            received,
            drift_seconds: (panel - received).num_seconds(),
        }
    }

    /// ACK inside the drift window (bounds included), NAK outside.
    pub fn verdict(&self, timestamps: &Timestamps) -> Verdict {
        if self.window.contains(timestamps.drift_seconds) {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }

    /// Receiver time in the panel format, as carried by a NAK.
    pub fn format_receiver_time(&self, received: DateTime<Utc>) -> String {
        self.zone.format(received, PANEL_TIMESTAMP_FORMAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn plus_two_hours() -> TimestampReconciler {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        TimestampReconciler::new(LocalZone::Fixed(offset), DriftWindow::default())
    }

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 25, 12, 12, 4).unwrap()
    }

    #[rstest]
    #[case("_12:12:04,09-25-2024", 0)]
    #[case("_12:12:30,09-25-2024", 26)]
    #[case("_12:11:44,09-25-2024", -20)]
    #[case("_12:12:45,09-25-2024", 41)]
    #[case("_14:12:04,09-25-2024", 0)]
    #[case("_14:12:30,09-25-2024", 26)]
    #[case("_14:07:05,09-25-2024", -299)]
    #[case("_14:07:04,09-25-2024", 6900)]
    #[case("_14:07:03,09-25-2024", 6899)]
    #[case("_14:17:04,09-25-2024", 7500)]
    fn test_reconcile_drift(#[case] text: &str, #[case] expected: i64) {
        let ts = plus_two_hours().reconcile(Some(text), received());
        assert_eq!(ts.drift_seconds, expected);
        assert_eq!(ts.received, received());
    }

    #[test]
    fn test_reconcile_local_band_reinterprets_panel() {
        let ts = plus_two_hours().reconcile(Some("_14:12:04,09-25-2024"), received());
        assert_eq!(ts.panel, received());
    }

    #[rstest]
    #[case(None)]
    #[case(Some("_"))]
    #[case(Some("_25:61:00,13-40-2024"))]
    fn test_reconcile_without_panel_time(#[case] text: Option<&str>) {
        let ts = plus_two_hours().reconcile(text, received());
        assert_eq!(ts, Timestamps::received_only(received()));
    }

    #[test]
    fn test_reconcile_truncates_subseconds() {
        let with_millis = received() + chrono::Duration::milliseconds(750);
        let ts = plus_two_hours().reconcile(Some("_12:12:04,09-25-2024"), with_millis);
        assert_eq!(ts.received, received());
        assert_eq!(ts.drift_seconds, 0);
    }

    #[test]
    fn test_parse_ignores_trailing_text() {
        let parsed = parse_panel_time("_14:12:04,09-25-2024\0\0 extra").unwrap();
        assert_eq!(parsed.and_utc().timestamp(), 1_727_273_524);
    }

    #[rstest]
    #[case(-21, Verdict::Reject)]
    #[case(-20, Verdict::Accept)]
    #[case(40, Verdict::Accept)]
    #[case(41, Verdict::Reject)]
    #[case(-600, Verdict::Reject)]
    fn test_verdict(#[case] drift: i64, #[case] expected: Verdict) {
        let ts = Timestamps {
            panel: received(),
            received: received(),
            drift_seconds: drift,
        };
        assert_eq!(plus_two_hours().verdict(&ts), expected);
    }

    #[test]
    fn test_format_receiver_time_uses_local_zone() {
        assert_eq!(
            plus_two_hours().format_receiver_time(received()),
            "_14:12:04,09-25-2024"
        );
    }

    #[test]
    fn test_from_settings_offset() {
        let settings: ServerSettings =
            siaip_core::ReceiverConfig::from_yaml_str("server:\n  key: k\n  utc_offset_minutes: 60\n")
                .unwrap()
                .server;
        let reconciler = TimestampReconciler::from_settings(&settings);
        assert_eq!(
            reconciler.format_receiver_time(received()),
            "_13:12:04,09-25-2024"
        );
        assert_eq!(reconciler.window(), DriftWindow::default());
    }
}
