//! Reconciliation of a single Schedule.
//!
//! The reconciler:
//! - Looks the Schedule up in the local cache
//! - Evaluates every item's window against the current time
//! - Scales the target of every active item
//! - Records the outcome as events

use std::sync::Arc;

use kss_schedule::{ObjectKey, WeekdayTime};
use tracing::{debug, info, instrument, warn};

use crate::cache::ScheduleLister;
use crate::clock::Clock;
use crate::error::ReconcileError;
use crate::recorder::{
    EventKind, Recorder, MESSAGE_SYNCED, REASON_INVALID_SCHEDULE, REASON_SCALED,
    REASON_SCALE_FAILED, REASON_SYNCED,
};
use crate::scale::{ScaleError, Scaler};

/// Result of a successful reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The Schedule is no longer in the cache.
    Missing,

    /// Every active item was applied.
    Synced(SyncReport),
}

/// What a reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Items declared on the Schedule.
    pub evaluated: usize,

    /// Items whose window contains the current time.
    pub active: usize,

    /// Active items whose target was scaled.
    pub scaled: usize,

    /// Indices of items that failed validation.
    pub invalid: Vec<usize>,
}

/// Applies Schedules to their target workloads.
pub struct ScheduleReconciler {
    lister: Arc<dyn ScheduleLister>,
    scaler: Arc<dyn Scaler>,
    recorder: Arc<dyn Recorder>,
    clock: Arc<dyn Clock>,
}

impl ScheduleReconciler {
    pub fn new(
        lister: Arc<dyn ScheduleLister>,
        scaler: Arc<dyn Scaler>,
        recorder: Arc<dyn Recorder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lister,
            scaler,
            recorder,
            clock,
        }
    }

    /// Reconcile the Schedule stored under `key`.
    ///
    /// Items are applied best effort: an invalid item or a failed scale call
    /// does not stop the remaining items. Scale failures are returned as a
    /// retryable error after all items have been tried.
    #[instrument(skip(self), name = "reconcile")]
    pub async fn reconcile(&self, key: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let key = ObjectKey::parse(key)?;

        let Some(schedule) = self.lister.get(&key) else {
            info!(key = %key, "Schedule no longer exists, skipping");
            return Ok(ReconcileOutcome::Missing);
        };

        let now = WeekdayTime::at(&self.clock.now());
        let mut report = SyncReport {
            evaluated: schedule.items().len(),
            ..SyncReport::default()
        };
        let mut failures: Vec<ScaleError> = Vec::new();

        for (index, item) in schedule.items().iter().enumerate() {
            let window = match item.window() {
                Ok(window) => window,
                Err(e) => {
                    warn!(
                        key = %key,
                        item = index,
                        selector = %item.selector,
                        error = %e,
                        "Skipping invalid schedule item"
                    );
                    self.recorder.record(
                        &key,
                        EventKind::Warning,
                        REASON_INVALID_SCHEDULE,
                        &format!("item {} ({}): {}", index, item.selector, e),
                    );
                    report.invalid.push(index);
                    continue;
                }
            };

            if !window.contains(now) {
                debug!(key = %key, item = index, window = %window, now = %now, "Window inactive");
                continue;
            }

            report.active += 1;
            match self
                .scaler
                .set_replicas(schedule.namespace(), &item.selector, item.replicas)
                .await
            {
                Ok(()) => {
                    report.scaled += 1;
                    debug!(
                        key = %key,
                        target = %item.selector,
                        replicas = item.replicas,
                        window = %window,
                        "Applied replicas for active window"
                    );
                    self.recorder.record(
                        &key,
                        EventKind::Normal,
                        REASON_SCALED,
                        &format!("{} set to {} replicas", item.selector, item.replicas),
                    );
                }
                Err(e) => {
                    warn!(
                        key = %key,
                        target = %item.selector,
                        replicas = item.replicas,
                        error = %e,
                        "Failed to scale target"
                    );
                    self.recorder.record(
                        &key,
                        EventKind::Warning,
                        REASON_SCALE_FAILED,
                        &format!(
                            "failed to set {} to {} replicas: {}",
                            item.selector, item.replicas, e
                        ),
                    );
                    failures.push(e);
                }
            }
        }

        let failed = failures.len();
        if let Some(source) = failures.into_iter().next() {
            return Err(ReconcileError::Scale {
                key,
                failed,
                attempted: report.active,
                source,
            });
        }

        self.recorder
            .record(&key, EventKind::Normal, REASON_SYNCED, MESSAGE_SYNCED);
        Ok(ReconcileOutcome::Synced(report))
    }
}
