//! Rate limiters deciding how long a failed key waits before it is requeued.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Decides the requeue delay for a key.
pub trait RateLimiter<K>: Send + Sync {
    /// Delay before the key may be processed again. Counts as one requeue.
    fn when(&self, key: &K) -> Duration;

    /// Stop tracking the key (call after it was processed successfully).
    fn forget(&self, key: &K);

    /// Number of requeues recorded for the key since it was last forgotten.
    fn num_requeues(&self, key: &K) -> u32;
}

// =============================================================================
// Backoff Policy
// =============================================================================

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay for the first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
            jitter: 0.0,
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = 2.0_f64.powi(attempt.min(64) as i32);
        let mut delay = (self.base.as_secs_f64() * exp).min(self.max.as_secs_f64());

        if self.jitter > 0.0 {
            let spread = delay * self.jitter;
            delay += rand::rng().random_range(-spread..=spread);
        }

        Duration::from_secs_f64(delay.clamp(0.0, self.max.as_secs_f64()))
    }
}

// =============================================================================
// Per-key exponential limiter
// =============================================================================

/// Backs off each key exponentially on repeated failures.
pub struct ExponentialFailureRateLimiter<K> {
    backoff: BackoffPolicy,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K> ExponentialFailureRateLimiter<K> {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn failures(&self) -> MutexGuard<'_, HashMap<K, u32>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> RateLimiter<K> for ExponentialFailureRateLimiter<K>
where
    K: Clone + Eq + Hash + Send + Sync,
{
    fn when(&self, key: &K) -> Duration {
        let mut failures = self.failures();
        let count = failures.entry(key.clone()).or_insert(0);
        let attempt = *count;
        *count = count.saturating_add(1);
        self.backoff.delay(attempt)
    }

    fn forget(&self, key: &K) {
        self.failures().remove(key);
    }

    fn num_requeues(&self, key: &K) -> u32 {
        self.failures().get(key).copied().unwrap_or(0)
    }
}

// =============================================================================
// Token bucket
// =============================================================================

/// Overall token bucket shared by all keys.
///
/// Tokens refill at `rate` per second up to `burst`. A request that finds the
/// bucket empty reserves a future token and waits for it.
pub struct BucketRateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

impl BucketRateLimiter {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            rate: rate_per_sec.max(f64::MIN_POSITIVE),
            burst: burst as f64,
            bucket: Mutex::new(Bucket {
                tokens: burst as f64,
                last: Instant::now(),
            }),
        }
    }
}

impl<K> RateLimiter<K> for BucketRateLimiter {
    fn when(&self, _key: &K) -> Duration {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.rate)
        }
    }

    fn forget(&self, _key: &K) {}

    fn num_requeues(&self, _key: &K) -> u32 {
        0
    }
}

// =============================================================================
// Combinators
// =============================================================================

/// Applies the longest delay of several limiters.
pub struct MaxOfRateLimiter<K> {
    limiters: Vec<Box<dyn RateLimiter<K>>>,
}

impl<K> MaxOfRateLimiter<K> {
    pub fn new(limiters: Vec<Box<dyn RateLimiter<K>>>) -> Self {
        Self { limiters }
    }
}

impl<K> RateLimiter<K> for MaxOfRateLimiter<K> {
    fn when(&self, key: &K) -> Duration {
        self.limiters
            .iter()
            .map(|l| l.when(key))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, key: &K) {
        for limiter in &self.limiters {
            limiter.forget(key);
        }
    }

    fn num_requeues(&self, key: &K) -> u32 {
        self.limiters
            .iter()
            .map(|l| l.num_requeues(key))
            .max()
            .unwrap_or(0)
    }
}

/// Default per-item token bucket rate (requeues per second).
pub const DEFAULT_BUCKET_RATE: f64 = 10.0;

/// Default token bucket size.
pub const DEFAULT_BUCKET_BURST: u32 = 100;

/// Per-key exponential backoff (5ms doubling up to 1000s) combined with an
/// overall 10/s token bucket with a burst of 100.
pub fn default_controller_rate_limiter<K>() -> MaxOfRateLimiter<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    MaxOfRateLimiter::new(vec![
        Box::new(ExponentialFailureRateLimiter::new(BackoffPolicy::default())),
        Box::new(BucketRateLimiter::new(
            DEFAULT_BUCKET_RATE,
            DEFAULT_BUCKET_BURST,
        )),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(50),
            jitter: 0.0,
        };

        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(1), Duration::from_millis(20));
        assert_eq!(policy.delay(2), Duration::from_millis(40));
        assert_eq!(policy.delay(3), Duration::from_millis(50));
        assert_eq!(policy.delay(500), Duration::from_millis(50));
    }

    #[test]
    fn test_backoff_jitter_stays_bounded() {
        let policy = BackoffPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            jitter: 0.25,
        };

        for _ in 0..100 {
            let d = policy.delay(1);
            assert!(d >= Duration::from_millis(149));
            assert!(d <= Duration::from_millis(251));
        }
    }

    #[test]
    fn test_exponential_limiter_per_key() {
        let limiter = ExponentialFailureRateLimiter::new(BackoffPolicy {
            base: Duration::from_millis(1),
            max: Duration::from_secs(1),
            jitter: 0.0,
        });
        let a = "default/a".to_string();
        let b = "default/b".to_string();

        assert_eq!(limiter.when(&a), Duration::from_millis(1));
        assert_eq!(limiter.when(&a), Duration::from_millis(2));
        assert_eq!(limiter.when(&a), Duration::from_millis(4));
        assert_eq!(limiter.when(&b), Duration::from_millis(1));
        assert_eq!(limiter.num_requeues(&a), 3);

        limiter.forget(&a);
        assert_eq!(limiter.num_requeues(&a), 0);
        assert_eq!(limiter.when(&a), Duration::from_millis(1));
        assert_eq!(limiter.num_requeues(&b), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_allows_burst_then_waits() {
        let limiter = BucketRateLimiter::new(10.0, 3);
        let key = "k";

        for _ in 0..3 {
            assert_eq!(RateLimiter::<&str>::when(&limiter, &key), Duration::ZERO);
        }
        assert_eq!(
            RateLimiter::<&str>::when(&limiter, &key),
            Duration::from_millis(100)
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(RateLimiter::<&str>::when(&limiter, &key), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_of_takes_longest() {
        let limiter: MaxOfRateLimiter<String> = MaxOfRateLimiter::new(vec![
            Box::new(ExponentialFailureRateLimiter::new(BackoffPolicy {
                base: Duration::from_millis(1),
                max: Duration::from_secs(1),
                jitter: 0.0,
            })),
            Box::new(BucketRateLimiter::new(1.0, 1)),
        ]);
        let key = "default/web".to_string();

        assert_eq!(limiter.when(&key), Duration::from_millis(1));
        assert_eq!(limiter.when(&key), Duration::from_secs(1));
        assert_eq!(limiter.num_requeues(&key), 2);

        limiter.forget(&key);
        assert_eq!(limiter.num_requeues(&key), 0);
    }
}
