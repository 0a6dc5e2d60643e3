//! Download engine: per-file retry loop plus batch orchestration.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use tracing::{info, instrument, warn};

use super::error::EngineError;
use super::retry::{self, RetryDecision};
use super::transfer::{self, ProgressCallback, TransferOutcome};
use crate::catalog::{CatalogStore, DownloadStatus, FileFormat, FileRecord, StateUpdate};
use crate::config::Config;
use crate::governance::{ConcurrencyGate, HostRateLimiter, host_key};
use crate::torrentzip;

/// Bytes read from the tail of a published ZIP to look for a TorrentZip
/// marker in its trailing archive comment; matches [`torrentzip`]'s own
/// maximum comment scan so the read never has to retry with a bigger slice.
const TORRENTZIP_TAIL_BYTES: u64 = 66_000;

/// Lower/upper bound (bytes/sec) of the "server appears to be throttling us"
/// heuristic.
const SPEED_LIMITED_RANGE: std::ops::RangeInclusive<f64> = 8_000.0..=12_000.0;

/// Outcome of one [`DownloadEngine::download`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadResult {
    /// The file is now published at its `local_path` (or already was).
    Ok,
    /// Every retry attempt was exhausted, or a terminal failure occurred.
    Failed,
}

/// Tally returned by [`DownloadEngine::download_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Records that reached `completed`.
    pub successful: usize,
    /// Records that reached `failed`.
    pub failed: usize,
    /// Records already `completed` on entry, left untouched.
    pub skipped: usize,
}

/// Reads at most the trailing `max_bytes` of the file at `path`, for the
/// TorrentZip marker scan. Returns `None` on any IO failure — this is a
/// best-effort inspection, never worth failing a completed download over.
async fn read_tail(path: &std::path::Path, max_bytes: u64) -> Option<Vec<u8>> {
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    let mut file = tokio::fs::File::open(path).await.ok()?;
    let len = file.metadata().await.ok()?.len();
    let start = len.saturating_sub(max_bytes);
    file.seek(std::io::SeekFrom::Start(start)).await.ok()?;
    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf).await.ok()?;
    Some(buf)
}

/// Drives the crawl-to-catalog pipeline's downstream half: reads `pending`
/// records, runs them through the gate, limiter, and [`transfer`], and
/// writes every state transition back to the catalog.
#[derive(Clone)]
pub struct DownloadEngine {
    client: Client,
    catalog: Arc<dyn CatalogStore>,
    config: Arc<Config>,
    gate: ConcurrencyGate,
    limiter: HostRateLimiter,
}

impl DownloadEngine {
    /// Builds an engine sharing `client` and `catalog` with the rest of the
    /// process, governed by `config`'s concurrency/rate-limit/retry settings.
    #[must_use]
    pub fn new(client: Client, catalog: Arc<dyn CatalogStore>, config: Arc<Config>) -> Self {
        let gate = ConcurrencyGate::new(config.concurrency.global_max, config.concurrency.per_host);
        let limiter = HostRateLimiter::new(config.rate_limit.tokens_per_sec, config.rate_limit.burst);
        Self { client, catalog, config, gate, limiter }
    }

    /// Downloads one record end to end: a no-op success if already
    /// `completed`, otherwise the full acquire/retry/transfer loop.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only for catalog I/O failures or a
    /// malformed URL; ordinary transfer failures resolve to
    /// [`DownloadResult::Failed`] with `error_message` set on the record.
    #[instrument(skip(self, record, progress), fields(url = %record.url))]
    pub async fn download(
        &self,
        record: &FileRecord,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<DownloadResult, EngineError> {
        if record.status == DownloadStatus::Completed {
            return Ok(DownloadResult::Ok);
        }

        let url = url::Url::parse(&record.url)
            .map_err(|source| EngineError::InvalidUrl { url: record.url.clone(), source })?;
        let host = host_key(&url);

        let _permit = self
            .gate
            .acquire(&host)
            .await
            .map_err(|source| EngineError::GateClosed { host: host.clone(), source })?;

        let max_attempts = self.config.retries.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.take(&host, 1.0).await;

            self.catalog
                .update_state(
                    &record.url,
                    &StateUpdate {
                        status: Some(DownloadStatus::Downloading),
                        download_attempts: Some(attempt),
                        ..StateUpdate::default()
                    },
                )
                .await?;

            let outcome = transfer::transfer(
                &self.client,
                record,
                &self.config.download_root,
                self.config.resume_downloads,
                self.config.verify_checksums,
                &self.catalog,
                progress,
            )
            .await;

            match outcome {
                Ok(result) => {
                    self.mark_completed(record, result).await?;
                    info!(url = %record.url, attempt, "download completed");
                    return Ok(DownloadResult::Ok);
                }
                Err(error) => {
                    let failure = retry::classify_error(&error);
                    warn!(url = %record.url, attempt, %error, "transfer attempt failed");

                    let decision = retry::should_retry(
                        failure,
                        attempt,
                        max_attempts,
                        self.config.retries.backoff_base_s,
                        self.config.retries.backoff_cap_s,
                    );

                    match decision {
                        RetryDecision::Retry { delay } => {
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        RetryDecision::DoNotRetry => {
                            self.catalog
                                .update_state(
                                    &record.url,
                                    &StateUpdate {
                                        status: Some(DownloadStatus::Failed),
                                        error_message: Some(Some(error.to_string())),
                                        ..StateUpdate::default()
                                    },
                                )
                                .await?;
                            return Ok(DownloadResult::Failed);
                        }
                    }
                }
            }
        }
    }

    async fn mark_completed(
        &self,
        record: &FileRecord,
        outcome: TransferOutcome,
    ) -> Result<(), EngineError> {
        let speed = if outcome.elapsed.as_secs_f64() > 0.0 {
            Some(outcome.bytes_written_this_attempt as f64 / outcome.elapsed.as_secs_f64())
        } else {
            None
        };
        let is_speed_limited = speed.is_some_and(|value| SPEED_LIMITED_RANGE.contains(&value));

        let local = transfer::local_path(&self.config.download_root, record);
        let bytes_downloaded =
            tokio::fs::metadata(&local).await.map(|meta| meta.len()).unwrap_or(record.bytes_downloaded);

        let marker = if record.file_format == FileFormat::Zip && self.config.verify_checksums {
            read_tail(&local, TORRENTZIP_TAIL_BYTES).await.and_then(|tail| torrentzip::inspect_trailing_comment(&tail))
        } else {
            None
        };

        self.catalog
            .update_state(
                &record.url,
                &StateUpdate {
                    status: Some(DownloadStatus::Completed),
                    local_path: Some(Some(local.display().to_string())),
                    bytes_downloaded: Some(bytes_downloaded),
                    completed_at: Some(Some(Utc::now())),
                    average_download_speed: Some(speed),
                    is_speed_limited: Some(is_speed_limited),
                    is_torrentzipped: Some(marker.is_some()),
                    torrentzip_crc32: Some(marker.map(|m| m.crc32_hex)),
                    ..StateUpdate::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Downloads every record in `records`, skipping those already
    /// `completed`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if any record's catalog write fails; a single
    /// record's transfer failure does not abort the batch.
    pub async fn download_batch(&self, records: &[FileRecord]) -> Result<BatchOutcome, EngineError> {
        let mut outcome = BatchOutcome::default();
        for record in records {
            if record.status == DownloadStatus::Completed {
                outcome.skipped += 1;
                continue;
            }
            match self.download(record, None).await? {
                DownloadResult::Ok => outcome.successful += 1,
                DownloadResult::Failed => outcome.failed += 1,
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::db::Database;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn memory_engine(base_url: &str, download_root: &std::path::Path) -> DownloadEngine {
        let db = Database::new_in_memory().await.expect("in-memory db");
        let catalog: Arc<dyn CatalogStore> = Arc::new(SqliteCatalog::new(db));
        let mut config = Config::builder()
            .base_url(base_url.to_string())
            .download_root(download_root.to_path_buf())
            .build()
            .expect("valid config");
        config.retries.max_attempts = 3;
        config.retries.backoff_base_s = 0;
        config.retries.backoff_cap_s = 0;
        let client = crate::http_client::build(&config).expect("client");
        DownloadEngine::new(client, catalog, Arc::new(config))
    }

    fn record(url: String) -> FileRecord {
        FileRecord::discovered(url, "game.zip".to_string(), Some(5), String::new(), Utc::now())
    }

    #[tokio::test]
    async fn successful_download_marks_completed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/game.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let engine = memory_engine(&server.uri(), dir.path()).await;
        let rec = record(format!("{}/game.zip", server.uri()));
        engine.catalog.upsert_discovery(&rec).await.unwrap();

        let result = engine.download(&rec, None).await.unwrap();
        assert_eq!(result, DownloadResult::Ok);

        let fetched = engine.catalog.get(&rec.url).await.unwrap().unwrap();
        assert_eq!(fetched.status, DownloadStatus::Completed);
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn completed_zip_with_torrentzip_marker_is_flagged() {
        let mut body = b"PK\x03\x04fake entry bytes".to_vec();
        body.extend_from_slice(b"PK\x05\x06");
        body.extend_from_slice(&[0u8; 16]);
        let comment = b"TORRENTZIPPED-DEADBEEF";
        body.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        body.extend_from_slice(comment);

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/game.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let engine = memory_engine(&server.uri(), dir.path()).await;
        let rec = FileRecord::discovered(
            format!("{}/game.zip", server.uri()),
            "game.zip".to_string(),
            Some(body.len() as u64),
            String::new(),
            Utc::now(),
        );
        engine.catalog.upsert_discovery(&rec).await.unwrap();

        let result = engine.download(&rec, None).await.unwrap();
        assert_eq!(result, DownloadResult::Ok);

        let fetched = engine.catalog.get(&rec.url).await.unwrap().unwrap();
        assert!(fetched.is_torrentzipped);
        assert_eq!(fetched.torrentzip_crc32.as_deref(), Some("DEADBEEF"));
    }

    #[tokio::test]
    async fn exhausted_retries_mark_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/game.zip"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let engine = memory_engine(&server.uri(), dir.path()).await;
        let rec = record(format!("{}/game.zip", server.uri()));
        engine.catalog.upsert_discovery(&rec).await.unwrap();

        let result = engine.download(&rec, None).await.unwrap();
        assert_eq!(result, DownloadResult::Failed);

        let fetched = engine.catalog.get(&rec.url).await.unwrap().unwrap();
        assert_eq!(fetched.status, DownloadStatus::Failed);
        assert!(fetched.error_message.is_some());
        assert_eq!(fetched.download_attempts, 3);
    }

    #[tokio::test]
    async fn already_completed_record_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let engine = memory_engine("https://example.test", dir.path()).await;
        let mut rec = record("https://example.test/game.zip".to_string());
        rec.status = DownloadStatus::Completed;
        engine.catalog.upsert_discovery(&rec).await.unwrap();

        let result = engine.download(&rec, None).await.unwrap();
        assert_eq!(result, DownloadResult::Ok);
    }

    #[tokio::test]
    async fn download_batch_skips_completed_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/b.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let engine = memory_engine(&server.uri(), dir.path()).await;

        let mut completed = record(format!("{}/a.zip", server.uri()));
        completed.status = DownloadStatus::Completed;
        let pending = record(format!("{}/b.zip", server.uri()));
        engine.catalog.upsert_discovery(&completed).await.unwrap();
        engine.catalog.upsert_discovery(&pending).await.unwrap();

        let outcome = engine.download_batch(&[completed, pending]).await.unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.successful, 1);
    }
}
