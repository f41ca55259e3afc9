//! Deduplicating work queue.
//!
//! Keys move through three states:
//!
//! ```text
//!   add() ──► queued ──get()──► processing ──done()──► idle
//!                ▲                   │
//!                └── dirty on done ◄─┘  (re-added while processing)
//! ```
//!
//! - A key is queued at most once, no matter how often it is added.
//! - A key handed to a worker is not handed to another worker until `done`.
//! - Adding a key while it is processing marks it dirty; `done` requeues it
//!   exactly once, so no update is lost.

use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::rate_limit::{default_controller_rate_limiter, RateLimiter};

/// Bounds required of queue keys.
pub trait QueueKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Debug + Send + Sync + 'static> QueueKey for T {}

/// Rate-limited, deduplicating queue shared by the watch side and workers.
///
/// Cloning is cheap; clones share the same queue.
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<K> {
    name: String,
    state: Mutex<State<K>>,
    /// Wakes workers blocked in `get`.
    available: Notify,
    /// Wakes `shutdown_with_drain` when processing empties.
    idle: Notify,
    rate_limiter: Box<dyn RateLimiter<K>>,
}

struct State<K> {
    /// Keys waiting for a worker, in arrival order.
    queue: VecDeque<K>,
    /// Keys that need processing (queued, or re-added while processing).
    dirty: HashSet<K>,
    /// Keys currently held by a worker.
    processing: HashSet<K>,
    shutting_down: bool,
}

impl<K: QueueKey> WorkQueue<K> {
    /// Create a queue with the default controller rate limiter.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rate_limiter(name, Box::new(default_controller_rate_limiter()))
    }

    /// Create a queue with a custom rate limiter.
    pub fn with_rate_limiter(
        name: impl Into<String>,
        rate_limiter: Box<dyn RateLimiter<K>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    shutting_down: false,
                }),
                available: Notify::new(),
                idle: Notify::new(),
                rate_limiter,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn state(&self) -> MutexGuard<'_, State<K>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a key as needing processing.
    ///
    /// No-op if the key is already queued or the queue is shutting down. If
    /// the key is being processed it is requeued when the worker calls `done`.
    pub fn add(&self, key: K) {
        let mut state = self.state();
        if state.shutting_down {
            trace!(queue = %self.inner.name, ?key, "Ignoring add during shutdown");
            return;
        }
        if !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.inner.available.notify_one();
    }

    /// Add a key once `delay` has elapsed.
    pub fn add_after(&self, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Requeue a key after the rate limiter's delay for it.
    pub fn add_rate_limited(&self, key: K) {
        let delay = self.inner.rate_limiter.when(&key);
        debug!(
            queue = %self.inner.name,
            ?key,
            delay_ms = delay.as_millis() as u64,
            "Requeueing with backoff"
        );
        self.add_after(key, delay);
    }

    /// Clear the rate limiter's history for a key.
    pub fn forget(&self, key: &K) {
        self.inner.rate_limiter.forget(key);
    }

    /// Number of times the key has been requeued since it was last forgotten.
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.inner.rate_limiter.num_requeues(key)
    }

    /// Wait for the next key.
    ///
    /// Returns `None` once the queue is shut down and no keys remain queued.
    /// The caller owns the key until it calls [`WorkQueue::done`].
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.available.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent add or shutdown is not missed.
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Finish processing a key, requeueing it if it was added meanwhile.
    pub fn done(&self, key: &K) {
        let mut state = self.state();
        state.processing.remove(key);

        let requeued = state.dirty.contains(key);
        if requeued {
            state.queue.push_back(key.clone());
        }
        let idle = state.processing.is_empty();
        drop(state);

        if requeued {
            self.inner.available.notify_one();
        }
        if idle {
            self.inner.idle.notify_waiters();
        }
    }

    /// Stop accepting keys and release waiting workers once drained.
    pub fn shutdown(&self) {
        self.state().shutting_down = true;
        debug!(queue = %self.inner.name, "Work queue shutting down");
        self.inner.available.notify_waiters();
    }

    /// Shut down and wait until no key is being processed.
    pub async fn shutdown_with_drain(&self) {
        self.shutdown();

        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.state().processing.is_empty() {
                return;
            }
            idle.await;
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Number of keys waiting for a worker.
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys currently held by workers.
    pub fn processing_len(&self) -> usize {
        self.state().processing.len()
    }
}
