//! Politeness governance: per-host rate limiting and two-tier concurrency
//! admission. Both are process-lifetime objects keyed by host, lazily
//! created under a map-level lock.

mod gate;
mod rate_limiter;

pub use gate::{ConcurrencyGate, DownloadPermit};
pub use rate_limiter::{HostRateLimiter, host_key};
