//! Error types for schedule validation and key parsing.

use thiserror::Error;

/// Errors produced while turning declared schedule data into windows.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The day name is not a full English weekday name.
    #[error("invalid weekday: '{0}'")]
    InvalidWeekday(String),

    /// The hour is outside 0..=23.
    #[error("invalid hour: {0} (expected 0-23)")]
    InvalidHour(i64),

    /// The minute is outside 0..=59.
    #[error("invalid minute: {0} (expected 0-59)")]
    InvalidMinute(i64),

    /// A span is missing from the item.
    #[error("schedule item is missing its {0} span")]
    MissingSpan(&'static str),
}

impl ScheduleError {
    /// Returns true if this error comes from a bad day name.
    pub fn is_weekday_error(&self) -> bool {
        matches!(self, ScheduleError::InvalidWeekday(_))
    }

    /// Returns true if this error comes from an out-of-range time of day.
    pub fn is_time_error(&self) -> bool {
        matches!(
            self,
            ScheduleError::InvalidHour(_) | ScheduleError::InvalidMinute(_)
        )
    }
}

/// Errors that can occur when parsing an object key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The key string is empty.
    #[error("key cannot be empty")]
    Empty,

    /// The key has an empty name segment.
    #[error("key '{0}' has an empty name")]
    EmptyName(String),

    /// The key has more than one separator.
    #[error("unexpected key format: '{0}' (expected namespace/name)")]
    TooManySegments(String),
}
