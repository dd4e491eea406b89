//! Timestamp normalization
//!
//! Agents record timestamps in a handful of formats. Everything is
//! normalized to UTC; strings outside the fixed format set yield `None`
//! and are logged once per distinct prefix so a corrupt file cannot flood
//! the log.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::OnceLock;

/// How much of an unparseable string is kept for the warn-once key and the
/// log line.
const WARN_PREFIX_LEN: usize = 32;

fn warned_prefixes() -> &'static Mutex<HashSet<String>> {
    static WARNED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    WARNED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Parse a timestamp string from an agent transcript.
///
/// Accepted formats:
/// - ISO 8601 UTC (`2024-05-01T12:00:00Z`), with or without fractional
///   seconds, and with numeric offsets (normalized to UTC)
/// - `YYYY-MM-DD HH:MM:SS` (treated as UTC)
///
/// Bare dates, numeric epochs, and unknown strings return `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }

    warn_once(trimmed);
    None
}

fn warn_once(raw: &str) {
    let prefix: String = raw.chars().take(WARN_PREFIX_LEN).collect();
    let mut seen = warned_prefixes().lock().unwrap();
    if seen.insert(prefix.clone()) {
        tracing::warn!(value = %prefix, "unparseable timestamp, storing none");
    }
}

/// Parse an epoch value in milliseconds, used by agents that store JSON
/// number timestamps (amp `created`, opencode `time_*` columns).
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_iso_utc() {
        let ts = parse_timestamp("2024-05-01T12:30:00Z").unwrap();
        assert_eq!(ts.hour(), 12);
        assert_eq!(ts.minute(), 30);
    }

    #[test]
    fn test_iso_nanos() {
        let ts = parse_timestamp("2024-05-01T12:30:00.123456789Z").unwrap();
        assert_eq!(ts.nanosecond(), 123_456_789);
    }

    #[test]
    fn test_iso_offset_normalized() {
        let ts = parse_timestamp("2024-05-01T14:30:00+02:00").unwrap();
        assert_eq!(ts.hour(), 12);
    }

    #[test]
    fn test_space_separated() {
        let ts = parse_timestamp("2024-05-01 12:30:00").unwrap();
        assert_eq!(ts.hour(), 12);
    }

    #[test]
    fn test_rejects_bare_date_and_epoch() {
        assert!(parse_timestamp("2024-05-01").is_none());
        assert!(parse_timestamp("1714564200").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_epoch_millis() {
        let ts = from_epoch_millis(1_714_564_200_000).unwrap();
        assert_eq!(ts.timestamp(), 1_714_564_200);
    }
}
