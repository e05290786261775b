// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamp formatting shared by every table.
//!
//! All timestamps are UTC, millisecond precision, fixed width, so string
//! comparison in SQL matches chronological order. The format matches SQLite's
//! `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')`.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

use crate::error::BridgeError;

/// chrono format string for stored timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a UTC instant the way the database stores it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// The current instant, formatted for storage.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// `at - span`, saturating at the earliest representable instant.
pub fn instant_before(at: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(span)
        .ok()
        .and_then(|d| at.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `at + span`, saturating at the latest representable instant.
pub fn instant_after(at: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(span)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Parse a caller-supplied `since` cursor.
///
/// Accepts RFC 3339 (any offset) and the bare `YYYY-MM-DD HH:MM:SS` form,
/// the latter read as UTC.
///
/// Cursors have millisecond precision, the same as stored rows: a
/// sub-millisecond fraction is dropped by [`format_timestamp`], and the
/// strict `created_at > since` filter then excludes every row stored in the
/// cursor's millisecond.
pub fn parse_since(raw: &str) -> Result<DateTime<Utc>, BridgeError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| BridgeError::invalid(format!("unrecognized timestamp `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stored_format_is_fixed_width() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(at), "2026-01-02T03:04:05.000Z");
    }

    #[test]
    fn parse_since_accepts_rfc3339_with_offset() {
        let parsed = parse_since("2026-01-02T05:04:05+02:00").unwrap();
        assert_eq!(format_timestamp(parsed), "2026-01-02T03:04:05.000Z");
    }

    #[test]
    fn parse_since_accepts_space_separated() {
        let parsed = parse_since("2026-01-02 03:04:05").unwrap();
        assert_eq!(format_timestamp(parsed), "2026-01-02T03:04:05.000Z");
    }

    #[test]
    fn sub_millisecond_cursor_compares_within_its_millisecond() {
        let cursor = format_timestamp(parse_since("2026-01-02T03:04:05.0009Z").unwrap());
        assert_eq!(cursor, "2026-01-02T03:04:05.000Z");
        // A row stored in the same millisecond is not after the cursor.
        assert!("2026-01-02T03:04:05.000Z" <= cursor.as_str());
        assert!("2026-01-02T03:04:05.001Z" > cursor.as_str());
    }

    #[test]
    fn instant_arithmetic_saturates() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            format_timestamp(instant_before(at, Duration::from_secs(3600))),
            "2026-01-02T02:04:05.000Z"
        );
        assert_eq!(
            format_timestamp(instant_after(at, Duration::from_millis(1500))),
            "2026-01-02T03:04:06.500Z"
        );
        assert_eq!(instant_after(at, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn parse_since_rejects_garbage() {
        let err = parse_since("yesterday").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidInput { .. }));
    }
}
