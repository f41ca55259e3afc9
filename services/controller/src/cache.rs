//! Local, read-mostly index of Schedules.
//!
//! The informer is the only writer. Reconcilers read through
//! [`ScheduleLister`] and tolerate the cache lagging behind the source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use kss_schedule::{ObjectKey, Schedule};

/// Read access to cached Schedules.
pub trait ScheduleLister: Send + Sync {
    /// Look up a Schedule by key.
    fn get(&self, key: &ObjectKey) -> Option<Arc<Schedule>>;

    /// All cached Schedules, in key order.
    fn list(&self) -> Vec<Arc<Schedule>>;

    /// Returns true once the first full list has been loaded.
    fn has_synced(&self) -> bool;
}

/// In-memory Schedule cache keyed by namespace/name.
#[derive(Debug, Default)]
pub struct ScheduleCache {
    objects: RwLock<HashMap<ObjectKey, Arc<Schedule>>>,
    synced: AtomicBool,
}

impl ScheduleCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ObjectKey, Arc<Schedule>>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ObjectKey, Arc<Schedule>>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a Schedule, returning the previous version.
    pub fn upsert(&self, schedule: Schedule) -> Option<Arc<Schedule>> {
        self.write().insert(schedule.key(), Arc::new(schedule))
    }

    /// Remove a Schedule, returning it if it was cached.
    pub fn remove(&self, key: &ObjectKey) -> Option<Arc<Schedule>> {
        self.write().remove(key)
    }

    /// Keys of every cached Schedule.
    pub fn keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<_> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScheduleLister for ScheduleCache {
    fn get(&self, key: &ObjectKey) -> Option<Arc<Schedule>> {
        self.read().get(key).cloned()
    }

    fn list(&self) -> Vec<Arc<Schedule>> {
        let mut schedules: Vec<_> = self.read().values().cloned().collect();
        schedules.sort_by_key(|s| s.key());
        schedules
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use kss_schedule::ScheduleItem;

    use super::*;

    fn schedule(namespace: &str, name: &str, replicas: u32) -> Schedule {
        Schedule::new(
            namespace,
            name,
            vec![ScheduleItem::new("web", replicas, ("Monday", 8, 0), ("Friday", 18, 0))],
        )
    }

    #[test]
    fn test_upsert_get_remove() {
        let cache = ScheduleCache::new();
        assert!(cache.upsert(schedule("default", "a", 1)).is_none());

        let previous = cache.upsert(schedule("default", "a", 2)).unwrap();
        assert_eq!(previous.items()[0].replicas, 1);

        let key = ObjectKey::new("default", "a");
        assert_eq!(cache.get(&key).unwrap().items()[0].replicas, 2);

        assert!(cache.remove(&key).is_some());
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_list_is_sorted() {
        let cache = ScheduleCache::new();
        cache.upsert(schedule("prod", "b", 1));
        cache.upsert(schedule("default", "z", 1));
        cache.upsert(schedule("prod", "a", 1));

        let names: Vec<_> = cache.list().iter().map(|s| s.key().to_string()).collect();
        assert_eq!(names, vec!["default/z", "prod/a", "prod/b"]);
        assert_eq!(cache.keys().len(), 3);
    }

    #[test]
    fn test_synced_flag() {
        let cache = ScheduleCache::new();
        assert!(!cache.has_synced());
        cache.mark_synced();
        assert!(cache.has_synced());
    }
}
