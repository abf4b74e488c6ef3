//! Timestamps are stored as second-precision RFC 3339 UTC text so that string
//! comparison in SQL orders them chronologically.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().ok().or_else(|| {
        // Tolerate SQLite's "YYYY-MM-DD HH:MM:SS" if a row was written by hand.
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|ndt| ndt.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_drops_subseconds() {
        let ts = Utc.with_ymd_and_hms(2030, 5, 1, 9, 30, 0).unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(fmt_ts(ts), "2030-05-01T09:30:00Z");
    }

    #[test]
    fn test_parse_both_layouts() {
        let expected = Utc.with_ymd_and_hms(2030, 5, 1, 9, 30, 0).unwrap();
        assert_eq!(parse_ts("2030-05-01T09:30:00Z"), Some(expected));
        assert_eq!(parse_ts("2030-05-01 09:30:00"), Some(expected));
        assert_eq!(parse_ts("yesterday"), None);
    }

    #[test]
    fn test_text_order_matches_time_order() {
        let a = Utc.with_ymd_and_hms(2030, 1, 9, 23, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2030, 1, 10, 1, 0, 0).unwrap();
        assert!(fmt_ts(a) < fmt_ts(b));
    }
}
