//! Weekday name parsing.
//!
//! Only full English day names are accepted, in any letter case. The lookup
//! table is built once per process and shared read-only.

use std::collections::HashMap;

use chrono::Weekday;
use once_cell::sync::Lazy;

use crate::ScheduleError;

static WEEKDAYS: Lazy<HashMap<&'static str, Weekday>> = Lazy::new(|| {
    HashMap::from([
        ("sunday", Weekday::Sun),
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
    ])
});

/// Parse a full English weekday name.
pub fn parse_weekday(day: &str) -> Result<Weekday, ScheduleError> {
    let normalized = day.trim().to_ascii_lowercase();
    WEEKDAYS
        .get(normalized.as_str())
        .copied()
        .ok_or_else(|| ScheduleError::InvalidWeekday(day.to_string()))
}

/// Full English name of a weekday, capitalized.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
}
