// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and parsing.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC3339 timestamp into UTC.
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse the expiry timestamp from a Jobber OAuth token response.
///
/// Jobber formats `expires_at` as `"2024-04-09 21:04:31 UTC"`, which is
/// not RFC3339. Accept that format first, then RFC3339 as a fallback.
pub fn parse_jobber_expiry(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S UTC") {
        return Some(naive.and_utc());
    }
    parse_rfc3339(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_jobber_expiry_native_format() {
        let parsed = parse_jobber_expiry("2024-04-09 21:04:31 UTC").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 4, 9, 21, 4, 31).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_jobber_expiry_rfc3339_fallback() {
        let parsed = parse_jobber_expiry("2024-04-09T21:04:31Z").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 4, 9, 21, 4, 31).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_jobber_expiry_garbage() {
        assert!(parse_jobber_expiry("not a timestamp").is_none());
        assert!(parse_jobber_expiry("").is_none());
    }

    #[test]
    fn test_rfc3339_round_trip() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let formatted = format_utc_rfc3339(now);
        assert_eq!(formatted, "2026-01-02T03:04:05Z");
        assert_eq!(parse_rfc3339(&formatted).unwrap(), now);
    }
}
