//! Timestamp utilities

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::time::SystemTime;

/// Accepted naive timestamp layouts, tried in order after RFC 3339.
///
/// `%.f` also matches a missing fractional part.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Parse a response timestamp as written by the study app or legacy exports.
///
/// Offsets are normalized to UTC. Returns `None` for empty or unrecognized
/// input; timestamps are informational, so callers never fail on them.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Convert a filesystem modification time to UTC
pub fn system_time_to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::time::Duration;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01
    }

    #[test]
    fn test_parse_isoformat_with_micros() {
        let dt = parse_timestamp("2024-01-01T12:00:00.123456").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_parse_isoformat_without_fraction() {
        let dt = parse_timestamp("2024-03-05T08:09:10").unwrap();
        assert_eq!(dt.day(), 5);
        assert_eq!(dt.second(), 10);
    }

    #[test]
    fn test_parse_space_separated() {
        let dt = parse_timestamp(" 2024-01-01 12:30:00 ").unwrap();
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_parse_rfc3339_normalizes_to_utc() {
        let dt = parse_timestamp("2024-01-01T12:00:00+02:00").unwrap();
        assert_eq!(dt.hour(), 10);
    }

    #[test]
    fn test_parse_slash_separated() {
        let dt = parse_timestamp("2024/01/15 12:00:00").unwrap();
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 15);
    }

    #[test]
    fn test_parse_date_only() {
        let dt = parse_timestamp("2024-02-29").unwrap();
        assert_eq!(dt.hour(), 0);
        assert_eq!(dt.day(), 29);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("nan").is_none());
    }

    #[test]
    fn test_system_time_epoch() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
        assert_eq!(system_time_to_utc(t).timestamp(), 86_400);
    }
}
