//! Event recording for audit trails.
//!
//! Recording is fire-and-forget: implementations must not block and must not
//! fail the reconcile that records.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use kss_schedule::ObjectKey;
use tracing::{info, warn};

/// Reason recorded when a schedule was reconciled without scale failures.
pub const REASON_SYNCED: &str = "Synced";

/// Message recorded with [`REASON_SYNCED`].
pub const MESSAGE_SYNCED: &str = "Schedule synced successfully";

/// Reason recorded when an active window scaled its target.
pub const REASON_SCALED: &str = "Scaled";

/// Reason recorded for an item that cannot be evaluated.
pub const REASON_INVALID_SCHEDULE: &str = "InvalidSchedule";

/// Reason recorded when a scale call fails.
pub const REASON_SCALE_FAILED: &str = "ScaleFailed";

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Normal => "Normal",
            EventKind::Warning => "Warning",
        }
    }
}

/// Records events about a Schedule.
pub trait Recorder: Send + Sync {
    fn record(&self, subject: &ObjectKey, kind: EventKind, reason: &str, message: &str);
}

/// Emits recorded events as structured log lines.
#[derive(Debug, Clone)]
pub struct TracingRecorder {
    component: String,
}

impl TracingRecorder {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

impl Recorder for TracingRecorder {
    fn record(&self, subject: &ObjectKey, kind: EventKind, reason: &str, message: &str) {
        match kind {
            EventKind::Normal => info!(
                component = %self.component,
                subject = %subject,
                reason,
                "{}", message
            ),
            EventKind::Warning => warn!(
                component = %self.component,
                subject = %subject,
                reason,
                "{}", message
            ),
        }
    }
}

/// A recorded event, as kept by [`MemoryRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub subject: ObjectKey,
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Keeps events in memory. Used by tests.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events recorded with the given reason.
    pub fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .collect()
    }
}

impl Recorder for MemoryRecorder {
    fn record(&self, subject: &ObjectKey, kind: EventKind, reason: &str, message: &str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedEvent {
                subject: subject.clone(),
                kind,
                reason: reason.to_string(),
                message: message.to_string(),
                at: Utc::now(),
            });
    }
}
