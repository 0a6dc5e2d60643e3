//! Error types for the download engine and its per-file transfer.

use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogError;

/// Failure raised by one [`super::transfer::transfer`] attempt.
///
/// Every variant except [`TransferError::ChecksumMismatch`] is retryable —
/// the engine's retry loop decides whether budget remains. A checksum
/// mismatch is terminal: the upstream blob differs from what the catalog
/// expects, and no amount of retrying changes that.
#[derive(Debug, Error)]
pub enum TransferError {
    /// DNS failure, connection reset, TLS error, or similar.
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The file's URL.
        url: String,
        /// The underlying `reqwest` error.
        #[source]
        source: reqwest::Error,
    },

    /// The server returned a status this engine does not treat as success
    /// or as the special 416-with-complete-temp case.
    #[error("unexpected HTTP status {status} fetching {url}")]
    HttpStatus {
        /// The file's URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// HTTP 416 (Range Not Satisfiable) where the local `.part` does not
    /// already match the known size — the only case this status does not
    /// resolve to success.
    #[error("range refused for {url} and local partial file does not match the expected size")]
    RangeRefused {
        /// The file's URL.
        url: String,
    },

    /// A filesystem operation (create dir, open, write, rename) failed.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path being operated on.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The stream closed with fewer (or more) bytes than the known size.
    #[error("size mismatch for {url}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The file's URL.
        url: String,
        /// The size the catalog/server reported.
        expected: u64,
        /// Bytes actually written.
        actual: u64,
    },

    /// Terminal: the full transfer's SHA-256 does not match the catalog's
    /// expected checksum.
    #[error("checksum mismatch for {url}: expected {expected}, calculated {actual}")]
    ChecksumMismatch {
        /// The file's URL.
        url: String,
        /// The checksum the catalog expected.
        expected: String,
        /// The checksum actually computed over the transferred bytes.
        actual: String,
    },
}

impl TransferError {
    /// Network/timeout error constructor.
    pub(crate) fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// IO error constructor.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this failure should end the retry loop immediately rather
    /// than consume another attempt.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ChecksumMismatch { .. })
    }
}

/// Errors surfaced by [`super::engine::DownloadEngine`] itself, distinct
/// from a per-attempt [`TransferError`] (which is absorbed into the
/// catalog's `status`/`error_message` rather than propagated).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The catalog rejected a read or write.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The record's URL could not be parsed (should not happen for a URL
    /// the crawler itself produced).
    #[error("invalid record URL {url}: {source}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The concurrency gate's semaphore was closed while waiting for a
    /// permit. Only happens if the gate itself is torn down mid-download.
    #[error("concurrency gate closed while acquiring a permit for {host}")]
    GateClosed {
        /// The host key the permit was requested for.
        host: String,
        /// The underlying semaphore error.
        #[source]
        source: tokio::sync::AcquireError,
    },
}
