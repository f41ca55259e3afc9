//! The Schedule resource.
//!
//! Field names follow the `schedule.kube-start-stop.io/v1alpha1` resource, so
//! manifests written for the cluster deserialize unchanged.

use serde::{Deserialize, Serialize};

use crate::{ObjectKey, RecurringWindow, ScheduleError, WeekdayTime};

/// API group and version of the Schedule resource.
pub const API_VERSION: &str = "schedule.kube-start-stop.io/v1alpha1";

/// Kind of the Schedule resource.
pub const KIND: &str = "Schedule";

/// Namespace used when a manifest omits one.
pub const DEFAULT_NAMESPACE: &str = "default";

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Object metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,
}

/// A set of weekly scaling rules for workloads in one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: ScheduleSpec,

    /// Observed state. Never written by the controller.
    #[serde(default)]
    pub status: ScheduleStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    #[serde(default)]
    pub schedules: Vec<ScheduleItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatus {
    #[serde(default)]
    pub available_replicas: u32,
}

/// One scaling rule: while the window is active, `selector` runs `replicas`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleItem {
    /// Name of the target workload in the schedule's namespace.
    pub selector: String,

    #[serde(default)]
    pub replicas: u32,

    #[serde(default)]
    pub start: Option<SchedSpan>,

    #[serde(default, alias = "end")]
    pub stop: Option<SchedSpan>,
}

/// Raw weekday and time as written in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedSpan {
    pub day: String,

    #[serde(default)]
    pub time: TimeSpan,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    #[serde(default)]
    pub hour: i64,

    #[serde(default)]
    pub minute: i64,
}

/// A list of schedules, as returned by a list call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleList {
    #[serde(default)]
    pub items: Vec<Schedule>,
}

impl Schedule {
    /// Create a schedule with the given items.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        schedules: Vec<ScheduleItem>,
    ) -> Self {
        Self {
            api_version: Some(API_VERSION.to_string()),
            kind: Some(KIND.to_string()),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
            },
            spec: ScheduleSpec { schedules },
            status: ScheduleStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn items(&self) -> &[ScheduleItem] {
        &self.spec.schedules
    }

    /// Convert every item to its window, in declaration order.
    pub fn windows(&self) -> impl Iterator<Item = Result<RecurringWindow, ScheduleError>> + '_ {
        self.spec.schedules.iter().map(ScheduleItem::window)
    }
}

impl ScheduleItem {
    /// Create an item from raw (day, hour, minute) triples.
    pub fn new(
        selector: impl Into<String>,
        replicas: u32,
        start: (&str, i64, i64),
        stop: (&str, i64, i64),
    ) -> Self {
        Self {
            selector: selector.into(),
            replicas,
            start: Some(SchedSpan::new(start.0, start.1, start.2)),
            stop: Some(SchedSpan::new(stop.0, stop.1, stop.2)),
        }
    }

    /// Validate the item's spans and build its recurring window.
    pub fn window(&self) -> Result<RecurringWindow, ScheduleError> {
        let start = self
            .start
            .as_ref()
            .ok_or(ScheduleError::MissingSpan("start"))?
            .to_weekday_time()?;
        let end = self
            .stop
            .as_ref()
            .ok_or(ScheduleError::MissingSpan("stop"))?
            .to_weekday_time()?;
        Ok(RecurringWindow::new(start, end))
    }
}

impl SchedSpan {
    pub fn new(day: impl Into<String>, hour: i64, minute: i64) -> Self {
        Self {
            day: day.into(),
            time: TimeSpan { hour, minute },
        }
    }

    pub fn to_weekday_time(&self) -> Result<WeekdayTime, ScheduleError> {
        WeekdayTime::parse(&self.day, self.time.hour, self.time.minute)
    }
}
