//! Per-host token-bucket rate limiter.
//!
//! One [`Bucket`] per host is lazily created under a map-level lock. This
//! implementation releases the per-bucket lock across the wait and
//! re-acquires before re-checking — the bucket map is shared across many
//! concurrently-downloading tasks, and an uninterruptible async sleep under
//! the lock would serialize unrelated hosts' bookkeeping against each
//! other's wall-clock waits.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// State for a single host's token bucket.
#[derive(Debug)]
struct Bucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    updated: Instant,
}

impl Bucket {
    fn new(rate: f64, capacity: f64) -> Self {
        Self {
            rate,
            capacity,
            tokens: capacity,
            updated: Instant::now(),
        }
    }

    /// Refills based on elapsed time, then tries to take `n` tokens.
    /// Returns `Ok(())` if tokens were taken, or `Err(wait)` with how long
    /// the caller should sleep before trying again.
    fn try_take(&mut self, n: f64) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.updated = now;

        if self.tokens >= n {
            self.tokens -= n;
            Ok(())
        } else {
            let deficit = n - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.rate))
        }
    }
}

/// Per-host token-bucket rate limiter, keyed by `host:port`.
///
/// Cheaply cloneable (an `Arc` internally); intended to be shared across
/// every download task in a process.
#[derive(Debug, Clone)]
pub struct HostRateLimiter {
    rate: f64,
    capacity: f64,
    buckets: Arc<DashMap<String, Arc<Mutex<Bucket>>>>,
}

impl HostRateLimiter {
    /// Creates a limiter where every host gets its own bucket with the same
    /// `tokens_per_sec` rate and `burst` capacity.
    #[must_use]
    pub fn new(tokens_per_sec: f64, burst: f64) -> Self {
        Self {
            rate: tokens_per_sec,
            capacity: burst,
            buckets: Arc::new(DashMap::new()),
        }
    }

    fn bucket_for(&self, host: &str) -> Arc<Mutex<Bucket>> {
        if let Some(existing) = self.buckets.get(host) {
            return Arc::clone(&existing);
        }
        self.buckets
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::new(self.rate, self.capacity))))
            .clone()
    }

    /// Blocks until `n` tokens are available for `host`.
    #[instrument(skip(self), fields(%host, n))]
    pub async fn take(&self, host: &str, n: f64) {
        let bucket = self.bucket_for(host);
        loop {
            let wait = {
                let mut guard = bucket.lock().await;
                match guard.try_take(n) {
                    Ok(()) => None,
                    Err(wait) => Some(wait),
                }
            };
            match wait {
                None => return,
                Some(wait) => {
                    debug!(%host, wait_ms = wait.as_millis(), "rate limit wait");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// Extracts the `host[:port]` identity used to key governance state.
#[must_use]
pub fn host_key(url: &url::Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_burst_worth_of_takes_is_immediate() {
        let limiter = HostRateLimiter::new(1.0, 3.0);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.take("host.test", 1.0).await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn throttle_respect_ten_starts_take_at_least_seven_seconds() {
        // tokens_per_sec=1, burst=3, 10 starts.
        let limiter = HostRateLimiter::new(1.0, 3.0);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.take("host.test", 1.0).await;
        }
        assert!(
            start.elapsed() >= Duration::from_secs(6),
            "elapsed {:?} should approach 7s for 10 takes at 1/s with burst 3",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn different_hosts_do_not_share_a_bucket() {
        let limiter = HostRateLimiter::new(1.0, 1.0);
        limiter.take("a.test", 1.0).await;
        let start = Instant::now();
        limiter.take("b.test", 1.0).await;
        assert!(
            start.elapsed() < Duration::from_millis(200),
            "a different host's bucket must not be drained by a.test's take"
        );
    }

    #[test]
    fn host_key_includes_explicit_port() {
        let url = url::Url::parse("https://example.test:8443/file.zip").unwrap();
        assert_eq!(host_key(&url), "example.test:8443");
    }

    #[test]
    fn host_key_omits_absent_port() {
        let url = url::Url::parse("https://example.test/file.zip").unwrap();
        assert_eq!(host_key(&url), "example.test");
    }
}
