//! Lenient date and time parsing for date and time outlier checks.
//!
//! Values that do not parse yield `None` and are excluded from the checks
//! rather than reported as outliers.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde_json::Value;

use crate::values::display_value;

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d-%b-%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y", "%d-%b-%Y", "%d %b %Y", "%b %d, %Y",
    "%B %d, %Y", "%d %B %Y", "%Y%m%d",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

/// Parses a cell into a date-time, trying common layouts in turn.
///
/// Dates without a time of day resolve to midnight; a bare four-digit year
/// resolves to January 1st.
pub fn parse_date_time(value: &Value) -> Option<NaiveDateTime> {
    let text = display_value(value);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_local());
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    if text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()) {
        let year = text.parse::<i32>().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0);
    }
    None
}

/// Parses a cell into a time of day. Full date-times contribute their time.
pub fn parse_time(value: &Value) -> Option<NaiveTime> {
    let text = display_value(value);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    for format in TIME_FORMATS {
        if let Ok(parsed) = NaiveTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    parse_date_time(value).map(|dt| dt.time())
}

/// Calendar year of a cell, if it parses as a date.
pub fn year_of(value: &Value) -> Option<i32> {
    parse_date_time(value).map(|dt| dt.year())
}

/// Hour of day of a cell, if it parses as a time.
pub fn hour_of(value: &Value) -> Option<u32> {
    parse_time(value).map(|t| t.hour())
}
