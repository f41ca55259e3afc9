//! # kss-schedule
//!
//! Weekly schedule windows and the Schedule resource model.
//!
//! ## Concepts
//!
//! - A [`Schedule`] holds one or more [`ScheduleItem`]s, each naming a target
//!   workload, a replica count, and a start/stop span of the week.
//! - A [`RecurringWindow`] is the validated form of one span. It repeats every
//!   week and may wrap past Saturday into the following week.
//! - [`RecurringWindow::contains`] decides whether a window is active at a
//!   given weekday and time of day.
//!
//! Weekday names are full English names, matched case-insensitively.

mod error;
mod key;
mod types;
mod weekday;
mod window;

pub use error::{KeyError, ScheduleError};
pub use key::ObjectKey;
pub use types::*;
pub use weekday::{parse_weekday, weekday_name};
pub use window::{RecurringWindow, TimeOfDay, WeekdayTime};
