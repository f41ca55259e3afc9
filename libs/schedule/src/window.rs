//! Recurring weekly windows and the containment check.
//!
//! A window runs from a start weekday/time to an end weekday/time and repeats
//! every week. Windows may wrap past the end of the week (Friday evening to
//! Monday morning). Both boundaries are inclusive at minute granularity.

use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};

use crate::weekday::{parse_weekday, weekday_name};
use crate::ScheduleError;

/// A validated time of day with minute precision.
///
/// Ordering is lexicographic on (hour, minute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// Midnight.
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { hour: 0, minute: 0 };

    /// Create a time of day, rejecting out-of-range values.
    pub fn new(hour: i64, minute: i64) -> Result<Self, ScheduleError> {
        if !(0..=23).contains(&hour) {
            return Err(ScheduleError::InvalidHour(hour));
        }
        if !(0..=59).contains(&minute) {
            return Err(ScheduleError::InvalidMinute(minute));
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// A point in the week: a weekday plus a time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdayTime {
    pub weekday: Weekday,
    pub time: TimeOfDay,
}

impl WeekdayTime {
    pub fn new(weekday: Weekday, time: TimeOfDay) -> Self {
        Self { weekday, time }
    }

    /// Build from a raw (day name, hour, minute) triple.
    pub fn parse(day: &str, hour: i64, minute: i64) -> Result<Self, ScheduleError> {
        let weekday = parse_weekday(day)?;
        let time = TimeOfDay::new(hour, minute)?;
        Ok(Self { weekday, time })
    }

    /// The point in the week of a UTC timestamp, truncated to the minute.
    pub fn at(t: &DateTime<Utc>) -> Self {
        Self {
            weekday: t.weekday(),
            // chrono guarantees hour < 24 and minute < 60
            time: TimeOfDay {
                hour: t.hour() as u8,
                minute: t.minute() as u8,
            },
        }
    }

    /// Days from `origin` forward to this weekday, in 0..7.
    fn days_after(&self, origin: Weekday) -> u32 {
        (self.weekday.num_days_from_sunday() + 7 - origin.num_days_from_sunday()) % 7
    }
}

impl fmt::Display for WeekdayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", weekday_name(self.weekday), self.time)
    }
}

/// A span of the week that recurs every seven days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurringWindow {
    pub start: WeekdayTime,
    pub end: WeekdayTime,
}

impl RecurringWindow {
    pub fn new(start: WeekdayTime, end: WeekdayTime) -> Self {
        Self { start, end }
    }

    /// Build a window from raw (day name, hour, minute) triples.
    pub fn from_raw(
        start: (&str, i64, i64),
        end: (&str, i64, i64),
    ) -> Result<Self, ScheduleError> {
        Ok(Self {
            start: WeekdayTime::parse(start.0, start.1, start.2)?,
            end: WeekdayTime::parse(end.0, end.1, end.2)?,
        })
    }

    /// Returns true if the window is active at the given point in the week.
    ///
    /// Weekdays are rebased so the start day is day 0, which turns a wrapping
    /// span into the linear range `[0, end_day]`. On the start day the instant
    /// must not precede the start time, and on the end day it must not follow
    /// the end time. Both checks compare (hour, minute) as one ordered pair.
    /// When both ends fall on the same weekday both checks apply, so a window
    /// whose start time is after its end time on one day is never active.
    pub fn contains(&self, instant: WeekdayTime) -> bool {
        if self.start == self.end {
            return false;
        }

        let end_day = self.end.days_after(self.start.weekday);
        let input_day = instant.days_after(self.start.weekday);

        if input_day > end_day {
            return false;
        }
        if input_day == 0 && instant.time < self.start.time {
            return false;
        }
        if input_day == end_day && instant.time > self.end.time {
            return false;
        }
        true
    }

    /// Returns true if the window is active at the given timestamp, in UTC.
    pub fn contains_at<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        self.contains(WeekdayTime::at(&t.with_timezone(&Utc)))
    }
}

impl fmt::Display for RecurringWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}
