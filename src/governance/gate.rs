//! Two-tier concurrency admission: one global semaphore, one per-host.
//!
//! A download acquires the global permit first, then the per-host permit,
//! and must release in reverse order on every exit path. This ordering is
//! expressed structurally in [`DownloadPermit`]: Rust drops struct fields in
//! declaration order, so the per-host permit is declared (and therefore
//! dropped) before the global one.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{AcquireError, Semaphore};
use tracing::instrument;

/// Holds both permits for one in-flight download. Dropping it releases the
/// per-host permit, then the global permit — the reverse of acquisition
/// order.
#[derive(Debug)]
pub struct DownloadPermit {
    _host: tokio::sync::OwnedSemaphorePermit,
    _global: tokio::sync::OwnedSemaphorePermit,
}

/// Admission control keyed by `host:port`.
///
/// Cheaply cloneable (an `Arc` internally); share one instance across every
/// download task in a process.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    global: Arc<Semaphore>,
    per_host: usize,
    hosts: Arc<DashMap<String, Arc<Semaphore>>>,
}

impl ConcurrencyGate {
    /// Builds a gate with `global_max` global permits and `per_host` permits
    /// per distinct host, the latter created lazily on first use.
    #[must_use]
    pub fn new(global_max: usize, per_host: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(global_max)),
            per_host,
            hosts: Arc::new(DashMap::new()),
        }
    }

    fn semaphore_for(&self, host: &str) -> Arc<Semaphore> {
        if let Some(existing) = self.hosts.get(host) {
            return Arc::clone(&existing);
        }
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host)))
            .clone()
    }

    /// Acquires global, then per-host, permits for `host`. Blocks until both
    /// are available.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] only if a semaphore has been closed, which
    /// this type never does — reserved for future cancellation support.
    #[instrument(skip(self), fields(%host))]
    pub async fn acquire(&self, host: &str) -> Result<DownloadPermit, AcquireError> {
        let global = Arc::clone(&self.global).acquire_owned().await?;
        let host_semaphore = self.semaphore_for(host);
        let host_permit = host_semaphore.acquire_owned().await?;
        Ok(DownloadPermit {
            _host: host_permit,
            _global: global,
        })
    }

    /// Number of global permits currently available (test/diagnostic use).
    #[must_use]
    pub fn available_global(&self) -> usize {
        self.global.available_permits()
    }

    /// Number of permits currently available for `host`, or `per_host` if the
    /// host has never been seen.
    #[must_use]
    pub fn available_for_host(&self, host: &str) -> usize {
        self.hosts
            .get(host)
            .map_or(self.per_host, |semaphore| semaphore.available_permits())
    }
}
