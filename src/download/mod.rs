//! The download engine and everything it depends on to move bytes from the
//! upstream archive onto disk: per-file [`transfer`], the retry-classification
//! helpers in [`retry`], and the [`engine::DownloadEngine`] that ties them to
//! the catalog, gate, and rate limiter.

mod engine;
mod error;
mod retry;
mod transfer;

pub use engine::{BatchOutcome, DownloadEngine, DownloadResult};
pub use error::{EngineError, TransferError};
pub use retry::{FailureType, RetryDecision, classify_error, should_retry};
pub use transfer::{ProgressCallback, TransferOutcome, local_path, transfer};
