//! Controller runtime.
//!
//! Wires watch events and a periodic resync into the work queue and runs a
//! fixed pool of workers that drain the queue into the reconciler.
//!
//! ## Flow
//!
//! ```text
//!   informer ──WatchEvent──► handle_event ──add──►┐
//!   resync ticker ─────────► enqueue_all ──add──►├─► WorkQueue ──get──► worker ──► reconcile
//!                                                 │                        │
//!                                                 └──── add_rate_limited ◄─┘ (retryable error)
//! ```

use std::sync::Arc;
use std::time::Duration;

use kss_reconcile::{WorkQueue, DEFAULT_RESYNC_INTERVAL, DEFAULT_WORKERS};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::ScheduleLister;
use crate::informer::WatchEvent;
use crate::reconciler::{ReconcileOutcome, ScheduleReconciler};

/// How often the controller checks whether the cache has synced.
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Controller runtime configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of reconcile workers.
    pub workers: usize,

    /// Interval between full resyncs of every cached Schedule.
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }
}

/// Drives reconciliation of every Schedule.
pub struct Controller {
    reconciler: Arc<ScheduleReconciler>,
    lister: Arc<dyn ScheduleLister>,
    queue: WorkQueue<String>,
    config: ControllerConfig,
}

impl Controller {
    /// Create a controller with the default work queue.
    pub fn new(
        reconciler: Arc<ScheduleReconciler>,
        lister: Arc<dyn ScheduleLister>,
        config: ControllerConfig,
    ) -> Self {
        Self::with_queue(reconciler, lister, config, WorkQueue::new("schedules"))
    }

    /// Create a controller that drains the given queue.
    pub fn with_queue(
        reconciler: Arc<ScheduleReconciler>,
        lister: Arc<dyn ScheduleLister>,
        config: ControllerConfig,
        queue: WorkQueue<String>,
    ) -> Self {
        Self {
            reconciler,
            lister,
            queue,
            config,
        }
    }

    pub fn queue(&self) -> &WorkQueue<String> {
        &self.queue
    }

    /// Enqueue the Schedule a watch event is about.
    ///
    /// Deletions are enqueued too; the reconcile observes the missing object.
    pub fn handle_event(&self, event: &WatchEvent) {
        if let WatchEvent::Updated { old, new } = event {
            if old == new {
                debug!(key = %new.key(), "Ignoring unchanged update");
                return;
            }
        }

        let key = event.key().to_string();
        debug!(key = %key, kind = event.kind(), "Enqueueing schedule");
        self.queue.add(key);
    }

    /// Enqueue every cached Schedule.
    pub fn enqueue_all(&self) -> usize {
        let schedules = self.lister.list();
        for schedule in &schedules {
            self.queue.add(schedule.key().to_string());
        }
        debug!(schedules = schedules.len(), "Resync enqueued schedules");
        schedules.len()
    }

    /// Take one key off the queue and reconcile it.
    ///
    /// Returns false once the queue has shut down.
    pub async fn process_next(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        match self.reconciler.reconcile(&key).await {
            Ok(ReconcileOutcome::Synced(report)) => {
                debug!(
                    key = %key,
                    evaluated = report.evaluated,
                    active = report.active,
                    scaled = report.scaled,
                    invalid = report.invalid.len(),
                    "Reconciled schedule"
                );
                self.queue.forget(&key);
            }
            Ok(ReconcileOutcome::Missing) => {
                self.queue.forget(&key);
            }
            Err(e) if e.is_retryable() => {
                error!(
                    key = %key,
                    error = %e,
                    requeues = self.queue.num_requeues(&key),
                    "Reconcile failed, requeueing with backoff"
                );
                self.queue.add_rate_limited(key.clone());
            }
            Err(e) => {
                error!(key = %key, error = %e, "Reconcile failed, dropping key");
                self.queue.forget(&key);
            }
        }

        self.queue.done(&key);
        true
    }

    /// Process keys until the queue shuts down.
    #[instrument(skip(self), name = "schedule_worker")]
    pub async fn run_worker(self: Arc<Self>, worker: usize) {
        debug!("Worker started");
        while self.process_next().await {}
        debug!("Worker stopped");
    }

    fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.config.workers)
            .map(|worker| tokio::spawn(Arc::clone(self).run_worker(worker)))
            .collect()
    }

    /// Run until the shutdown signal is set.
    ///
    /// Events are pumped into the queue from the start; workers and the
    /// resync ticker start once the cache has synced. On shutdown the queue is
    /// closed and every worker finishes its remaining keys before `run`
    /// returns.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        if self.config.workers == 0 {
            anyhow::bail!("controller needs at least one worker");
        }

        info!(
            workers = self.config.workers,
            resync_interval_secs = self.config.resync_interval.as_secs(),
            "Starting schedule controller"
        );

        let mut sync_check = tokio::time::interval(SYNC_POLL_INTERVAL);
        let mut resync = tokio::time::interval_at(
            Instant::now() + self.config.resync_interval,
            self.config.resync_interval,
        );
        resync.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut started = false;
        let mut events_open = true;

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    event = events.recv(), if events_open => {
                        match event {
                            Some(event) => self.handle_event(&event),
                            None => {
                                warn!("Watch event channel closed");
                                events_open = false;
                            }
                        }
                    }
                    _ = sync_check.tick(), if !started => {
                        if self.lister.has_synced() {
                            info!("Cache synced, starting workers");
                            workers = self.spawn_workers();
                            started = true;
                        } else {
                            debug!("Waiting for schedule cache to sync");
                        }
                    }
                    _ = resync.tick(), if started => {
                        self.enqueue_all();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }

        info!("Schedule controller shutting down");
        self.queue.shutdown();

        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }

        info!("Schedule controller stopped");
        Ok(())
    }
}
