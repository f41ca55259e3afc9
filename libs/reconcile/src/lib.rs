//! Reconciliation loop primitives.
//!
//! This library provides the work queue that sits between watch events and
//! reconcile workers. Key concepts:
//!
//! - **Key**: an opaque identifier of an object to reconcile (`namespace/name`).
//! - **Queue**: deduplicates keys and hands each to at most one worker at a time.
//! - **Rate limiter**: decides how long a failed key waits before it is retried.
//!
//! # Invariants
//!
//! - A key is never processed by two workers at once
//! - Adding a key while it is processing triggers exactly one follow-up
//! - Retry delays grow exponentially per key up to a ceiling

mod queue;
pub mod rate_limit;

pub use queue::{QueueKey, WorkQueue};
pub use rate_limit::{
    default_controller_rate_limiter, BackoffPolicy, BucketRateLimiter,
    ExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
};

use std::time::Duration;

/// Default interval for a full resync of every known object.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default interval for relisting objects from their source.
pub const DEFAULT_RELIST_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of reconcile workers.
pub const DEFAULT_WORKERS: usize = 2;
