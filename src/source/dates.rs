use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use crate::data::RawDate;

/// Parse a raw decision/update date into a calendar date.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps, `YYYY-MM-DD HH:MM:SS`, any text
/// starting with a `YYYY-MM-DD` prefix, and integer epoch milliseconds.
/// Returns `None` when parsing fails.
pub fn parse_raw_date(raw: &RawDate) -> Option<NaiveDate> {
    match raw {
        RawDate::Epoch(millis) => parse_epoch_millis(*millis),
        RawDate::Text(text) => parse_date_text(text),
    }
}

/// Parse a date or datetime string. Returns `None` when parsing fails.
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(datetime.date_naive());
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(datetime.date());
    }
    let prefix = trimmed.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Calendar date (UTC) of an epoch timestamp in milliseconds.
pub fn parse_epoch_millis(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|datetime| datetime.date_naive())
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day0(0).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn parses_supported_text_formats() {
        assert_eq!(parse_date_text("2020-01-02"), ymd(2020, 1, 2));
        assert_eq!(parse_date_text(" 2020-01-02 "), ymd(2020, 1, 2));
        assert_eq!(parse_date_text("2020-01-02T23:30:00+02:00"), ymd(2020, 1, 2));
        assert_eq!(parse_date_text("2020-01-02 08:15:00"), ymd(2020, 1, 2));
        assert_eq!(parse_date_text("2020-01-02T08:15:00.123"), ymd(2020, 1, 2));
    }

    #[test]
    fn rejects_invalid_text() {
        assert_eq!(parse_date_text(""), None);
        assert_eq!(parse_date_text("not-a-date"), None);
        assert_eq!(parse_date_text("2020-13-01"), None);
        assert_eq!(parse_date_text("02/01/2020"), None);
        assert_eq!(parse_date_text("2020-1"), None);
    }

    #[test]
    fn parses_epoch_milliseconds() {
        assert_eq!(
            parse_raw_date(&RawDate::Epoch(1_577_836_800_000)),
            ymd(2020, 1, 1)
        );
        assert_eq!(parse_raw_date(&RawDate::Epoch(0)), ymd(1970, 1, 1));
        assert_eq!(parse_raw_date(&RawDate::Epoch(i64::MAX)), None);
    }

    #[test]
    fn month_start_fixes_day_to_one() {
        assert_eq!(Some(month_start(ymd(2021, 7, 31).unwrap())), ymd(2021, 7, 1));
    }
}
