//! Shared parsing for upstream collision fields.
//!
//! The crash date arrives either as a bare date (after ingestion has
//! canonicalized it) or as a Socrata ISO 8601 datetime with optional
//! fractional seconds. Crash times come as `"9:35"` or `"14:30:00"`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Parses a crash date: `%Y-%m-%d`, or the date part of an ISO datetime.
#[must_use]
pub fn parse_crash_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    None
}

/// Parses a crash time: `%H:%M` or `%H:%M:%S`.
#[must_use]
pub fn parse_crash_time(s: &str) -> Option<NaiveTime> {
    if let Ok(time) = NaiveTime::parse_from_str(s, "%H:%M:%S") {
        return Some(time);
    }
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_date() {
        let date = parse_crash_date("2021-09-11").unwrap();
        assert_eq!(date.to_string(), "2021-09-11");
    }

    #[test]
    fn parses_socrata_datetime_with_fractional() {
        let date = parse_crash_date("2021-09-11T00:00:00.000").unwrap();
        assert_eq!(date.to_string(), "2021-09-11");
    }

    #[test]
    fn parses_socrata_datetime_without_fractional() {
        let date = parse_crash_date("2021-09-11T08:15:00").unwrap();
        assert_eq!(date.to_string(), "2021-09-11");
    }

    #[test]
    fn rejects_invalid_date() {
        assert!(parse_crash_date("eleventh of september").is_none());
        assert!(parse_crash_date("").is_none());
    }

    #[test]
    fn parses_single_digit_hour_time() {
        let time = parse_crash_time("9:35").unwrap();
        assert_eq!(time.to_string(), "09:35:00");
    }

    #[test]
    fn parses_time_with_seconds() {
        let time = parse_crash_time("14:30:45").unwrap();
        assert_eq!(time.to_string(), "14:30:45");
    }

    #[test]
    fn rejects_invalid_time() {
        assert!(parse_crash_time("25:99").is_none());
        assert!(parse_crash_time("noonish").is_none());
    }
}
