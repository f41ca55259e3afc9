//! Integration tests for the schedule controller.
//!
//! These tests run the whole pipeline on tokio:
//! 1. The informer lists Schedules and publishes watch events
//! 2. The controller queues keys and runs workers
//! 3. The reconciler evaluates windows and scales through the in-memory scaler
//!
//! Uses FixedClock so window decisions do not depend on the wall clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use kss_controller::recorder::{REASON_SCALE_FAILED, REASON_SYNCED};
use kss_controller::{
    Controller, ControllerConfig, FixedClock, InMemoryScaler, Informer, MemoryRecorder,
    ScheduleCache, ScheduleReconciler, StaticSource,
};
use kss_reconcile::{BackoffPolicy, ExponentialFailureRateLimiter, WorkQueue};
use kss_schedule::{Schedule, ScheduleItem};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

// Wednesday 2017-12-20 12:00 UTC
fn wednesday_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 12, 20, 12, 0, 0).unwrap()
}

// Saturday 2017-12-23 00:00 UTC
fn saturday_midnight() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 12, 23, 0, 0, 0).unwrap()
}

fn office_hours(replicas: u32) -> ScheduleItem {
    ScheduleItem::new("web", replicas, ("Monday", 8, 0), ("Friday", 18, 0))
}

fn weekend(replicas: u32) -> ScheduleItem {
    ScheduleItem::new("web", replicas, ("Friday", 20, 10), ("Monday", 10, 10))
}

struct Harness {
    source: Arc<StaticSource>,
    scaler: Arc<InMemoryScaler>,
    recorder: Arc<MemoryRecorder>,
    clock: Arc<FixedClock>,
    controller: Arc<Controller>,
    shutdown_tx: watch::Sender<bool>,
    informer_handle: JoinHandle<()>,
    controller_handle: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    fn start(schedules: Vec<Schedule>, now: DateTime<Utc>, resync_interval: Duration) -> Self {
        Self::start_with_scaler(schedules, now, resync_interval, Arc::new(InMemoryScaler::new()))
    }

    fn start_with_scaler(
        schedules: Vec<Schedule>,
        now: DateTime<Utc>,
        resync_interval: Duration,
        scaler: Arc<InMemoryScaler>,
    ) -> Self {
        let source = Arc::new(StaticSource::new(schedules));
        let recorder = Arc::new(MemoryRecorder::new());
        let clock = Arc::new(FixedClock::new(now));
        let cache = Arc::new(ScheduleCache::new());

        let informer = Informer::new(source.clone(), cache.clone(), Duration::from_millis(20));
        let reconciler = Arc::new(ScheduleReconciler::new(
            cache.clone(),
            scaler.clone(),
            recorder.clone(),
            clock.clone(),
        ));

        // Short backoff so retries happen within the test.
        let queue = WorkQueue::with_rate_limiter(
            "test-schedules",
            Box::new(ExponentialFailureRateLimiter::new(BackoffPolicy {
                base: Duration::from_millis(5),
                max: Duration::from_millis(50),
                jitter: 0.0,
            })),
        );
        let controller = Arc::new(Controller::with_queue(
            reconciler,
            cache,
            ControllerConfig {
                workers: 2,
                resync_interval,
            },
            queue,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::channel(16);

        let informer_handle = tokio::spawn({
            let shutdown_rx = shutdown_rx.clone();
            async move { informer.run(events_tx, shutdown_rx).await }
        });
        let controller_handle = tokio::spawn({
            let controller = Arc::clone(&controller);
            async move { controller.run(events_rx, shutdown_rx).await }
        });

        Self {
            source,
            scaler,
            recorder,
            clock,
            controller,
            shutdown_tx,
            informer_handle,
            controller_handle,
        }
    }

    async fn stop(self) {
        self.shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.informer_handle)
            .await
            .expect("informer did not stop")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.controller_handle)
            .await
            .expect("controller did not stop")
            .unwrap()
            .unwrap();
    }
}

async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_active_window_scales_target() {
    let h = Harness::start(
        vec![Schedule::new("default", "office", vec![office_hours(4), weekend(1)])],
        wednesday_noon(),
        Duration::from_secs(60),
    );

    wait_for("scale", || h.scaler.replicas("default", "web") == Some(4)).await;
    wait_for("synced event", || !h.recorder.with_reason(REASON_SYNCED).is_empty()).await;

    // Only the office-hours item is active on Wednesday.
    assert!(h.scaler.calls().iter().all(|c| c.replicas == 4));

    h.stop().await;
}

#[tokio::test]
async fn test_failed_scale_is_retried() {
    let scaler = Arc::new(InMemoryScaler::new());
    scaler.fail_next(2);
    let h = Harness::start_with_scaler(
        vec![Schedule::new("default", "weekend", vec![weekend(1)])],
        saturday_midnight(),
        Duration::from_secs(60),
        scaler,
    );

    wait_for("retried scale", || h.scaler.replicas("default", "web") == Some(1)).await;
    let key = "default/weekend".to_string();
    wait_for("forget", || h.controller.queue().num_requeues(&key) == 0).await;

    assert_eq!(h.scaler.calls().len(), 3);
    assert_eq!(h.recorder.with_reason(REASON_SCALE_FAILED).len(), 2);

    h.stop().await;
}

#[tokio::test]
async fn test_resync_applies_window_transition() {
    let h = Harness::start(
        vec![Schedule::new("default", "shifts", vec![office_hours(4), weekend(1)])],
        wednesday_noon(),
        Duration::from_millis(50),
    );

    wait_for("weekday scale", || h.scaler.replicas("default", "web") == Some(4)).await;

    // No watch event: only the resync notices the weekend started.
    h.clock.set(saturday_midnight());
    wait_for("weekend scale", || h.scaler.replicas("default", "web") == Some(1)).await;

    h.stop().await;
}

#[tokio::test]
async fn test_updated_schedule_is_reapplied() {
    let h = Harness::start(
        vec![Schedule::new("default", "office", vec![office_hours(4)])],
        wednesday_noon(),
        Duration::from_secs(60),
    );

    wait_for("initial scale", || h.scaler.replicas("default", "web") == Some(4)).await;

    h.source
        .replace(vec![Schedule::new("default", "office", vec![office_hours(6)])]);
    wait_for("updated scale", || h.scaler.replicas("default", "web") == Some(6)).await;

    h.stop().await;
}

#[tokio::test]
async fn test_deleted_schedule_leaves_replicas() {
    let h = Harness::start(
        vec![Schedule::new("default", "office", vec![office_hours(4)])],
        wednesday_noon(),
        Duration::from_millis(50),
    );

    wait_for("initial scale", || h.scaler.replicas("default", "web") == Some(4)).await;

    h.source.replace(vec![]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let calls = h.scaler.calls().len();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Deletion does not revert the target and later resyncs skip it.
    assert_eq!(h.scaler.replicas("default", "web"), Some(4));
    assert_eq!(h.scaler.calls().len(), calls);

    h.stop().await;
}
