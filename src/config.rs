//! Immutable runtime configuration for the crawl-persist-fetch pipeline.
//!
//! `Config` is constructed once per process (typically by the external CLI
//! after loading a config file) and handed by reference to the crawler,
//! catalog, rate limiter, and download engine. No field is hot-reloadable;
//! a new `Config` means a new process.

use std::path::PathBuf;

use thiserror::Error;

/// Default HTTP User-Agent sent on every request.
pub const DEFAULT_USER_AGENT: &str = concat!("archivist/", env!("CARGO_PKG_VERSION"));

/// Default global concurrent-download cap.
pub const DEFAULT_GLOBAL_MAX: usize = 8;

/// Default per-host concurrent-download cap.
pub const DEFAULT_PER_HOST: usize = 2;

/// Default sustained token-bucket rate (tokens/sec) per host.
pub const DEFAULT_TOKENS_PER_SEC: f64 = 2.0;

/// Default token-bucket burst capacity per host.
pub const DEFAULT_BURST: f64 = 4.0;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default read timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Default maximum attempts (including the initial one) per file.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay for the retry backoff, in seconds.
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 1;

/// Default backoff cap, in seconds.
pub const DEFAULT_BACKOFF_CAP_SECS: u64 = 60;

/// Default size ceiling applied by the crawler's filter (50 GiB).
pub const DEFAULT_MAX_DOWNLOAD_SIZE: u64 = 50 * 1024 * 1024 * 1024;

/// Errors rejected at `Config` construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `global_max` or `per_host` concurrency was zero.
    #[error("concurrency caps must be positive: global_max={global_max}, per_host={per_host}")]
    NonPositiveConcurrency {
        /// The offending global cap.
        global_max: usize,
        /// The offending per-host cap.
        per_host: usize,
    },

    /// `tokens_per_sec` was zero or negative while a burst was requested.
    #[error("tokens_per_sec must be positive, got {tokens_per_sec}")]
    NonPositiveRate {
        /// The offending rate.
        tokens_per_sec: f64,
    },

    /// `burst` was less than one token.
    #[error("burst must be >= 1.0, got {burst}")]
    InvalidBurst {
        /// The offending burst.
        burst: f64,
    },

    /// `backoff_cap_s` was smaller than `backoff_base_s`.
    #[error("backoff_cap_s ({backoff_cap_s}) must be >= backoff_base_s ({backoff_base_s})")]
    BackoffCapBelowBase {
        /// The configured base delay, in seconds.
        backoff_base_s: u64,
        /// The configured cap, in seconds.
        backoff_cap_s: u64,
    },

    /// `user_agent` was empty.
    #[error("user_agent must not be empty")]
    EmptyUserAgent,

    /// `max_attempts` was zero.
    #[error("max_attempts must be >= 1")]
    ZeroAttempts,
}

/// Two-tier concurrency caps: one global, one per host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimits {
    /// Maximum number of downloads in flight across all hosts.
    pub global_max: usize,
    /// Maximum number of downloads in flight against a single host.
    pub per_host: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self {
            global_max: DEFAULT_GLOBAL_MAX,
            per_host: DEFAULT_PER_HOST,
        }
    }
}

/// Token-bucket parameters shared by every per-host bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained rate, in tokens (bytes of request "cost") per second.
    pub tokens_per_sec: f64,
    /// Burst capacity: the bucket never holds more than this many tokens.
    pub burst: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_sec: DEFAULT_TOKENS_PER_SEC,
            burst: DEFAULT_BURST,
        }
    }
}

/// Connect/read timeouts applied to every HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// TCP/TLS connect timeout, in seconds.
    pub connect_s: u64,
    /// Read (idle-stream) timeout, in seconds.
    pub read_s: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_s: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_s: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

/// Retry/backoff policy for transient transfer failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum attempts per file, including the first.
    pub max_attempts: u32,
    /// Base delay for exponential backoff, in seconds.
    pub backoff_base_s: u64,
    /// Backoff ceiling, in seconds.
    pub backoff_cap_s: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_s: DEFAULT_BACKOFF_BASE_SECS,
            backoff_cap_s: DEFAULT_BACKOFF_CAP_SECS,
        }
    }
}

/// Immutable tunables for one crawl/download run.
///
/// Construct with [`Config::builder`] and call [`Config::validate`] (or use
/// [`Config::build`], which validates for you) before handing it to the
/// other components. Loading these values from a config file or environment
/// is the external CLI's job; this crate only owns the struct, its
/// defaults, and its validation rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Sent as the `User-Agent` header on every request.
    pub user_agent: String,
    /// Root directory final files are published under.
    pub download_root: PathBuf,
    /// The archive's top-level URL the crawler starts from.
    pub base_url: String,
    /// Two-tier concurrency caps.
    pub concurrency: ConcurrencyLimits,
    /// Per-host token-bucket parameters.
    pub rate_limit: RateLimitConfig,
    /// Connect/read timeouts.
    pub timeouts: TimeoutConfig,
    /// Retry/backoff policy.
    pub retries: RetryConfig,
    /// Glob patterns a file must match at least one of (empty = accept all).
    pub include_patterns: Vec<String>,
    /// Glob patterns that reject a file if any match.
    pub exclude_patterns: Vec<String>,
    /// Whether the download engine verifies `checksum` after transfer.
    pub verify_checksums: bool,
    /// Whether `.part` files are resumed via byte-range requests.
    pub resume_downloads: bool,
    /// Crawl-time size ceiling; files larger than this are filtered out.
    pub max_download_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            download_root: PathBuf::from("./downloads"),
            base_url: String::new(),
            concurrency: ConcurrencyLimits::default(),
            rate_limit: RateLimitConfig::default(),
            timeouts: TimeoutConfig::default(),
            retries: RetryConfig::default(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            verify_checksums: true,
            resume_downloads: true,
            max_download_size: DEFAULT_MAX_DOWNLOAD_SIZE,
        }
    }
}

impl Config {
    /// Starts a builder seeded with defaults.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates invariants that must hold before the config is used.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency.global_max == 0 || self.concurrency.per_host == 0 {
            return Err(ConfigError::NonPositiveConcurrency {
                global_max: self.concurrency.global_max,
                per_host: self.concurrency.per_host,
            });
        }
        if self.rate_limit.tokens_per_sec <= 0.0 {
            return Err(ConfigError::NonPositiveRate {
                tokens_per_sec: self.rate_limit.tokens_per_sec,
            });
        }
        if self.rate_limit.burst < 1.0 {
            return Err(ConfigError::InvalidBurst {
                burst: self.rate_limit.burst,
            });
        }
        if self.retries.backoff_cap_s < self.retries.backoff_base_s {
            return Err(ConfigError::BackoffCapBelowBase {
                backoff_base_s: self.retries.backoff_base_s,
                backoff_cap_s: self.retries.backoff_cap_s,
            });
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyUserAgent);
        }
        if self.retries.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }
}

/// Builder for [`Config`]; every setter returns `Self` for chaining.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    inner: ConfigInner,
}

/// Plain-data staging area backing the builder (kept separate from `Config`
/// only so `ConfigBuilder` can `#[derive(Default)]` cleanly).
#[derive(Debug, Clone)]
struct ConfigInner(Config);

impl Default for ConfigInner {
    fn default() -> Self {
        Self(Config::default())
    }
}

impl ConfigBuilder {
    /// Sets the HTTP `User-Agent`.
    #[must_use]
    pub fn user_agent(mut self, value: impl Into<String>) -> Self {
        self.inner.0.user_agent = value.into();
        self
    }

    /// Sets the download root directory.
    #[must_use]
    pub fn download_root(mut self, value: impl Into<PathBuf>) -> Self {
        self.inner.0.download_root = value.into();
        self
    }

    /// Sets the archive's base URL.
    #[must_use]
    pub fn base_url(mut self, value: impl Into<String>) -> Self {
        self.inner.0.base_url = value.into();
        self
    }

    /// Sets the two-tier concurrency caps.
    #[must_use]
    pub fn concurrency(mut self, value: ConcurrencyLimits) -> Self {
        self.inner.0.concurrency = value;
        self
    }

    /// Sets the per-host rate-limit parameters.
    #[must_use]
    pub fn rate_limit(mut self, value: RateLimitConfig) -> Self {
        self.inner.0.rate_limit = value;
        self
    }

    /// Sets the connect/read timeouts.
    #[must_use]
    pub fn timeouts(mut self, value: TimeoutConfig) -> Self {
        self.inner.0.timeouts = value;
        self
    }

    /// Sets the retry/backoff policy.
    #[must_use]
    pub fn retries(mut self, value: RetryConfig) -> Self {
        self.inner.0.retries = value;
        self
    }

    /// Sets the include glob patterns.
    #[must_use]
    pub fn include_patterns(mut self, value: Vec<String>) -> Self {
        self.inner.0.include_patterns = value;
        self
    }

    /// Sets the exclude glob patterns.
    #[must_use]
    pub fn exclude_patterns(mut self, value: Vec<String>) -> Self {
        self.inner.0.exclude_patterns = value;
        self
    }

    /// Sets whether checksums are verified after transfer.
    #[must_use]
    pub fn verify_checksums(mut self, value: bool) -> Self {
        self.inner.0.verify_checksums = value;
        self
    }

    /// Sets whether `.part` files are resumed.
    #[must_use]
    pub fn resume_downloads(mut self, value: bool) -> Self {
        self.inner.0.resume_downloads = value;
        self
    }

    /// Sets the crawl-time size ceiling.
    #[must_use]
    pub fn max_download_size(mut self, value: u64) -> Self {
        self.inner.0.max_download_size = value;
        self
    }

    /// Consumes the builder, returning the plain (unvalidated) [`Config`].
    #[must_use]
    pub fn finish(self) -> Config {
        self.inner.0
    }

    /// Consumes the builder, validating before returning.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any invariant in [`Config::validate`] fails.
    pub fn build(self) -> Result<Config, ConfigError> {
        let config = self.finish();
        config.validate()?;
        Ok(config)
    }
}
