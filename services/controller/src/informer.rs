//! List-and-diff informer feeding the Schedule cache.
//!
//! The informer periodically lists every Schedule from its source, applies the
//! difference to the cache, and emits one typed [`WatchEvent`] per change. The
//! cache is updated before the event is sent, so a reconcile triggered by the
//! event always sees the new object.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kss_schedule::{ObjectKey, Schedule};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{ScheduleCache, ScheduleLister};

/// Delay between list attempts until the first list succeeds.
pub const SYNC_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// A change to a Schedule.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(Schedule),
    Updated { old: Schedule, new: Schedule },
    Deleted(Schedule),
}

impl WatchEvent {
    /// Key of the Schedule the event is about.
    pub fn key(&self) -> ObjectKey {
        match self {
            WatchEvent::Added(s) | WatchEvent::Deleted(s) => s.key(),
            WatchEvent::Updated { new, .. } => new.key(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WatchEvent::Added(_) => "added",
            WatchEvent::Updated { .. } => "updated",
            WatchEvent::Deleted(_) => "deleted",
        }
    }
}

/// Where Schedules come from.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// List every Schedule currently declared.
    async fn list(&self) -> anyhow::Result<Vec<Schedule>>;
}

/// Keeps a [`ScheduleCache`] in step with a [`ScheduleSource`].
pub struct Informer {
    source: Arc<dyn ScheduleSource>,
    cache: Arc<ScheduleCache>,
    relist_interval: Duration,
}

impl Informer {
    pub fn new(
        source: Arc<dyn ScheduleSource>,
        cache: Arc<ScheduleCache>,
        relist_interval: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            relist_interval,
        }
    }

    pub fn cache(&self) -> &Arc<ScheduleCache> {
        &self.cache
    }

    /// List the source once and publish the differences.
    ///
    /// Returns the number of events emitted. A failed list leaves the cache
    /// untouched.
    pub async fn relist(&self, events: &mpsc::Sender<WatchEvent>) -> anyhow::Result<usize> {
        let listed = self.source.list().await?;

        let mut desired: BTreeMap<ObjectKey, Schedule> = BTreeMap::new();
        for schedule in listed {
            if let Some(dup) = desired.insert(schedule.key(), schedule) {
                warn!(key = %dup.key(), "Duplicate schedule in source, keeping the last one");
            }
        }

        let mut changes = Vec::new();

        for key in self.cache.keys() {
            if !desired.contains_key(&key) {
                if let Some(old) = self.cache.remove(&key) {
                    changes.push(WatchEvent::Deleted(Schedule::clone(&old)));
                }
            }
        }

        for (key, schedule) in desired {
            match self.cache.get(&key) {
                None => {
                    self.cache.upsert(schedule.clone());
                    changes.push(WatchEvent::Added(schedule));
                }
                Some(old) if *old != schedule => {
                    self.cache.upsert(schedule.clone());
                    changes.push(WatchEvent::Updated {
                        old: Schedule::clone(&old),
                        new: schedule,
                    });
                }
                Some(_) => {}
            }
        }

        let count = changes.len();
        for event in changes {
            debug!(key = %event.key(), kind = event.kind(), "Publishing watch event");
            if events.send(event).await.is_err() {
                warn!("Watch event receiver closed, dropping remaining events");
                break;
            }
        }

        Ok(count)
    }

    /// Relist until shutdown is signaled.
    ///
    /// The cache is marked synced after the first successful list.
    #[instrument(skip(self, events, shutdown), name = "schedule_informer")]
    pub async fn run(&self, events: mpsc::Sender<WatchEvent>, mut shutdown: watch::Receiver<bool>) {
        info!(
            relist_interval_secs = self.relist_interval.as_secs(),
            "Starting schedule informer"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.relist(&events).await {
                Ok(changes) => {
                    if !self.cache.has_synced() {
                        self.cache.mark_synced();
                        info!(schedules = self.cache.len(), "Schedule cache synced");
                    } else if changes > 0 {
                        debug!(changes, "Relist applied changes");
                    }
                    self.relist_interval
                }
                Err(e) => {
                    error!(error = %e, "Failed to list schedules");
                    if self.cache.has_synced() {
                        self.relist_interval
                    } else {
                        SYNC_RETRY_INTERVAL.min(self.relist_interval)
                    }
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Schedule informer shutting down");
    }
}

/// A source backed by a fixed, replaceable list. Used by tests.
#[derive(Debug, Default)]
pub struct StaticSource {
    schedules: std::sync::Mutex<Vec<Schedule>>,
}

impl StaticSource {
    pub fn new(schedules: Vec<Schedule>) -> Self {
        Self {
            schedules: std::sync::Mutex::new(schedules),
        }
    }

    pub fn replace(&self, schedules: Vec<Schedule>) {
        *self
            .schedules
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = schedules;
    }
}

#[async_trait]
impl ScheduleSource for StaticSource {
    async fn list(&self) -> anyhow::Result<Vec<Schedule>> {
        Ok(self
            .schedules
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use kss_schedule::ScheduleItem;

    use super::*;

    fn schedule(name: &str, replicas: u32) -> Schedule {
        Schedule::new(
            "default",
            name,
            vec![ScheduleItem::new("web", replicas, ("Monday", 8, 0), ("Friday", 18, 0))],
        )
    }

    struct FailingSource;

    #[async_trait]
    impl ScheduleSource for FailingSource {
        async fn list(&self) -> anyhow::Result<Vec<Schedule>> {
            anyhow::bail!("source unavailable")
        }
    }

    fn drain(rx: &mut mpsc::Receiver<WatchEvent>) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_relist_emits_add_update_delete() {
        let source = Arc::new(StaticSource::new(vec![schedule("a", 1), schedule("b", 1)]));
        let cache = Arc::new(ScheduleCache::new());
        let informer = Informer::new(source.clone(), cache.clone(), Duration::from_secs(60));
        let (tx, mut rx) = mpsc::channel(16);

        assert_eq!(informer.relist(&tx).await.unwrap(), 2);
        let events = drain(&mut rx);
        assert!(events.iter().all(|e| matches!(e, WatchEvent::Added(_))));
        assert_eq!(cache.len(), 2);

        // Unchanged list emits nothing.
        assert_eq!(informer.relist(&tx).await.unwrap(), 0);

        source.replace(vec![schedule("a", 5)]);
        assert_eq!(informer.relist(&tx).await.unwrap(), 2);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, WatchEvent::Deleted(s) if s.name() == "b")));
        assert!(events.iter().any(|e| matches!(
            e,
            WatchEvent::Updated { old, new } if old.items()[0].replicas == 1 && new.items()[0].replicas == 5
        )));

        let cached = cache.get(&ObjectKey::new("default", "a")).unwrap();
        assert_eq!(cached.items()[0].replicas, 5);
        assert!(cache.get(&ObjectKey::new("default", "b")).is_none());
    }

    #[tokio::test]
    async fn test_cache_updated_before_event() {
        let source = Arc::new(StaticSource::new(vec![schedule("a", 1)]));
        let cache = Arc::new(ScheduleCache::new());
        let informer = Informer::new(source, cache.clone(), Duration::from_secs(60));
        let (tx, mut rx) = mpsc::channel(16);

        informer.relist(&tx).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert!(cache.get(&event.key()).is_some());
    }

    #[tokio::test]
    async fn test_failed_list_leaves_cache_untouched() {
        let cache = Arc::new(ScheduleCache::new());
        cache.upsert(schedule("a", 1));
        let informer =
            Informer::new(Arc::new(FailingSource), cache.clone(), Duration::from_secs(60));
        let (tx, _rx) = mpsc::channel(16);

        assert!(informer.relist(&tx).await.is_err());
        assert_eq!(cache.len(), 1);
        assert!(!cache.has_synced());
    }

    #[tokio::test]
    async fn test_run_marks_synced_and_stops() {
        let source = Arc::new(StaticSource::new(vec![schedule("a", 1)]));
        let cache = Arc::new(ScheduleCache::new());
        let informer = Arc::new(Informer::new(source, cache.clone(), Duration::from_millis(10)));
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn({
            let informer = Arc::clone(&informer);
            async move { informer.run(tx, shutdown_rx).await }
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "added");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.has_synced());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("informer did not stop")
            .unwrap();
    }
}
