//! Failure classification for the download engine's retry loop.
//!
//! Keeps a simple `FailureType`/`RetryDecision` split with no jitter and no
//! auth/rate-limit branches — [`crate::config::RetryConfig`] has neither.

use std::time::Duration;

use super::error::TransferError;

/// Classification of one [`TransferError`], used only to decide whether the
/// engine's retry loop should consume another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// DNS/connection/TLS failure.
    Network,
    /// An HTTP status this engine doesn't treat as success.
    HttpStatus,
    /// 416 with a partial (not yet complete) local temp file.
    RangeRefused,
    /// A filesystem operation failed.
    Io,
    /// The stream closed with the wrong number of bytes.
    SizeMismatch,
    /// The fully-transferred hash didn't match the catalog's expectation.
    ChecksumMismatch,
}

/// What the engine's retry loop should do about a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep `delay`, then re-enter the loop as `attempt`.
    Retry {
        /// How long to sleep before the next attempt.
        delay: Duration,
    },
    /// Stop retrying; the record goes to `failed` immediately.
    DoNotRetry,
}

/// Maps a transfer failure to its [`FailureType`].
#[must_use]
pub fn classify_error(error: &TransferError) -> FailureType {
    match error {
        TransferError::Network { .. } => FailureType::Network,
        TransferError::HttpStatus { .. } => FailureType::HttpStatus,
        TransferError::RangeRefused { .. } => FailureType::RangeRefused,
        TransferError::Io { .. } => FailureType::Io,
        TransferError::SizeMismatch { .. } => FailureType::SizeMismatch,
        TransferError::ChecksumMismatch { .. } => FailureType::ChecksumMismatch,
    }
}

/// Decides whether `attempt` (1-based, the attempt that just failed with
/// `failure`) should be retried. Checksum mismatches never retry; everything
/// else retries until `max_attempts` is exhausted, with exponential backoff
/// capped at `backoff_cap_s`.
#[must_use]
pub fn should_retry(
    failure: FailureType,
    attempt: u32,
    max_attempts: u32,
    backoff_base_s: u64,
    backoff_cap_s: u64,
) -> RetryDecision {
    if failure == FailureType::ChecksumMismatch {
        return RetryDecision::DoNotRetry;
    }
    if attempt >= max_attempts {
        return RetryDecision::DoNotRetry;
    }
    let delay_s = backoff_cap_s.min(backoff_base_s.saturating_mul(1u64 << (attempt - 1).min(63)));
    RetryDecision::Retry { delay: Duration::from_secs(delay_s) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn checksum_mismatch_never_retries() {
        let decision = should_retry(FailureType::ChecksumMismatch, 1, 5, 1, 60);
        assert_eq!(decision, RetryDecision::DoNotRetry);
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        assert_eq!(
            should_retry(FailureType::Network, 1, 5, 1, 60),
            RetryDecision::Retry { delay: Duration::from_secs(1) }
        );
        assert_eq!(
            should_retry(FailureType::Network, 3, 5, 1, 60),
            RetryDecision::Retry { delay: Duration::from_secs(4) }
        );
        assert_eq!(
            should_retry(FailureType::Network, 10, 20, 1, 60),
            RetryDecision::Retry { delay: Duration::from_secs(60) }
        );
    }

    #[test]
    fn exhausted_attempts_stop_retrying() {
        let decision = should_retry(FailureType::Network, 5, 5, 1, 60);
        assert_eq!(decision, RetryDecision::DoNotRetry);
    }
}
