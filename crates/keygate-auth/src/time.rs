//! Textual timestamps for backends without a native temporal type.
//!
//! The format is `YYYY-MM-DD HH:MM:SS` in UTC at second precision. Values
//! produced by [`now_utc`] are truncated to whole seconds so that a write
//! followed by a read yields exactly the same instant.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

use crate::error::AuthError;

/// `strftime` pattern for stored timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Width of a formatted timestamp, used to size text columns.
pub const TIMESTAMP_LEN: usize = 19;

/// Current time in UTC, truncated to whole seconds.
#[inline]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Format a timestamp for storage.
#[inline]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp.
///
/// Anything that is not exactly in [`TIMESTAMP_FORMAT`] is reported as
/// [`AuthError::DataCorruption`].
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, AuthError> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| AuthError::corruption(format!("invalid timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_format_is_fixed_width() {
        let ts = Utc.with_ymd_and_hms(2017, 3, 4, 5, 6, 7).unwrap();
        let s = format_timestamp(ts);
        assert_eq!(s, "2017-03-04 05:06:07");
        assert_eq!(s.len(), TIMESTAMP_LEN);
    }

    #[test]
    fn test_now_round_trips_exactly() {
        let now = now_utc();
        let parsed = parse_timestamp(&format_timestamp(now)).unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn test_lexicographic_order_matches_time_order() {
        let earlier = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(format_timestamp(earlier) < format_timestamp(later));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, AuthError::DataCorruption(_)));

        let err = parse_timestamp("2024-01-01T00:00:00Z").unwrap_err();
        assert!(matches!(err, AuthError::DataCorruption(_)));
    }
}
