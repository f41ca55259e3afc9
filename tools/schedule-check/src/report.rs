//! Evaluation of manifest items at a given instant.

use chrono::{DateTime, Utc};
use kss_controller::Manifest;
use kss_schedule::WeekdayTime;
use serde::Serialize;
use tabled::Tabled;

/// One row per schedule item.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ItemRow {
    #[tabled(rename = "Schedule")]
    pub schedule: String,

    #[tabled(rename = "Item")]
    pub item: usize,

    #[tabled(rename = "Target")]
    pub target: String,

    #[tabled(rename = "Replicas")]
    pub replicas: u32,

    #[tabled(rename = "Window")]
    pub window: String,

    #[tabled(rename = "Active", display = "display_active")]
    pub active: Option<bool>,

    #[tabled(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn display_active(active: &Option<bool>) -> String {
    match active {
        Some(true) => "yes".to_string(),
        Some(false) => "no".to_string(),
        None => "invalid".to_string(),
    }
}

/// Result of checking a set of Schedules.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub at: DateTime<Utc>,
    pub rows: Vec<ItemRow>,

    /// Manifest objects that could not be decoded as Schedules.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl Report {
    /// Rows whose item could not be evaluated.
    pub fn invalid(&self) -> impl Iterator<Item = &ItemRow> {
        self.rows.iter().filter(|row| row.error.is_some())
    }

    pub fn is_valid(&self) -> bool {
        self.skipped.is_empty() && self.invalid().next().is_none()
    }
}

/// Evaluate every item of every Schedule at `at`.
pub fn check(manifest: &Manifest, at: DateTime<Utc>) -> Report {
    let now = WeekdayTime::at(&at);
    let mut rows = Vec::new();

    for schedule in &manifest.schedules {
        let key = schedule.key().to_string();
        for (index, item) in schedule.items().iter().enumerate() {
            let (window, active, error) = match item.window() {
                Ok(window) => (window.to_string(), Some(window.contains(now)), None),
                Err(e) => ("-".to_string(), None, Some(e.to_string())),
            };
            rows.push(ItemRow {
                schedule: key.clone(),
                item: index,
                target: item.selector.clone(),
                replicas: item.replicas,
                window,
                active,
                error,
            });
        }
    }

    Report {
        at,
        rows,
        skipped: manifest.invalid.iter().map(|o| o.to_string()).collect(),
    }
}
