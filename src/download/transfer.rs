//! Per-file resumable transfer.
//!
//! This is the innermost unit of work the engine's retry loop repeats: given
//! a [`FileRecord`] already past the concurrency gate and the rate limiter,
//! stream its bytes to a `.part` file and publish it atomically on success.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};

use super::error::TransferError;
use crate::catalog::{CatalogStore, FileRecord, StateUpdate};

/// Chunk size for streaming reads.
const CHUNK_BYTES: usize = 8 * 1024;

/// Minimum wall-clock interval between progress callback invocations.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Invoked during a transfer with `(record, bytes_downloaded, total_or_zero)`.
/// Must be fast and must not panic.
pub type ProgressCallback<'a> = dyn Fn(&FileRecord, u64, u64) + Send + Sync + 'a;

/// Outcome of one completed transfer attempt, fed into the engine's speed
/// accounting.
#[derive(Debug, Clone, Copy)]
pub struct TransferOutcome {
    /// Bytes written during *this* attempt (excludes any pre-existing resume
    /// bytes already on disk before the attempt started).
    pub bytes_written_this_attempt: u64,
    /// Wall-clock duration of the streaming phase.
    pub elapsed: Duration,
}

/// Resolves the on-disk path a completed `record` would publish to.
#[must_use]
pub fn local_path(download_root: &Path, record: &FileRecord) -> PathBuf {
    let console_dir = record.console.as_deref().unwrap_or("Unknown");
    download_root.join(console_dir).join(&record.name)
}

/// Runs one transfer attempt for `record`, writing to `local_path`'s `.part`
/// sibling and publishing on success.
///
/// Every second of streaming, and once more when the stream ends, this
/// persists `bytes_downloaded` to `catalog` in addition to invoking
/// `progress` — a `status`/`list` query against the catalog mid-download
/// must see a live count, not just the value as of the last completed
/// attempt. If `record.size` was unknown and the response carries a
/// `Content-Length`, the learned size is persisted the same way before the
/// body starts streaming. Catalog write failures here are logged and
/// swallowed; losing a progress update is not worth failing the transfer.
///
/// # Errors
///
/// Returns [`TransferError`] on any network, IO, size, or checksum failure.
/// [`TransferError::is_terminal`] distinguishes checksum mismatches (never
/// worth retrying) from everything else.
#[instrument(skip(client, record, catalog, progress), fields(url = %record.url))]
pub async fn transfer(
    client: &Client,
    record: &FileRecord,
    download_root: &Path,
    resume_downloads: bool,
    verify_checksums: bool,
    catalog: &Arc<dyn CatalogStore>,
    progress: Option<&ProgressCallback<'_>>,
) -> Result<TransferOutcome, TransferError> {
    let final_path = local_path(download_root, record);
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| TransferError::io(parent, source))?;
    }

    // Step 2: already-published file of the expected size is a no-op success.
    if let Some(expected) = record.size {
        if let Ok(meta) = fs::metadata(&final_path).await {
            if meta.len() == expected {
                debug!(path = %final_path.display(), "already complete, skipping transfer");
                return Ok(TransferOutcome {
                    bytes_written_this_attempt: 0,
                    elapsed: Duration::ZERO,
                });
            }
        }
    }

    let temp_path = temp_path_for(&final_path);
    let (start, mut hasher) = if resume_downloads {
        prehash_existing(&temp_path).await?
    } else {
        (0, Sha256::new())
    };

    let mut request = client.get(&record.url);
    if start > 0 {
        request = request.header(reqwest::header::RANGE, format!("bytes={start}-"));
    }
    let response = request
        .send()
        .await
        .map_err(|source| TransferError::network(&record.url, source))?;

    let status = response.status();
    if status == StatusCode::RANGE_NOT_SATISFIABLE {
        // A fully-downloaded .part is success here, not a retry decision.
        return finish_if_complete(&temp_path, &final_path, record, start, &record.url).await;
    }
    if !(status.is_success() || status.is_redirection()) {
        return Err(TransferError::HttpStatus {
            url: record.url.clone(),
            status: status.as_u16(),
        });
    }

    let content_length = response.content_length();
    // `content_length` on a 206 response is the *remaining* byte count, not
    // the file's total size.
    let known_size = if start == 0 {
        content_length.or(record.size)
    } else {
        record.size.or(content_length.map(|remaining| start + remaining))
    };
    let total_for_progress = known_size.unwrap_or(0);

    if record.size.is_none() {
        if let Some(learned) = known_size {
            if let Err(error) =
                catalog.update_state(&record.url, &StateUpdate { size: Some(learned), ..StateUpdate::default() }).await
            {
                warn!(url = %record.url, %error, "failed to persist newly-learned size");
            }
        }
    }

    let mut file = if start > 0 {
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&temp_path)
            .await
            .map_err(|source| TransferError::io(&temp_path, source))?;
        handle
            .seek(std::io::SeekFrom::End(0))
            .await
            .map_err(|source| TransferError::io(&temp_path, source))?;
        handle
    } else {
        File::create(&temp_path)
            .await
            .map_err(|source| TransferError::io(&temp_path, source))?
    };

    let mut bytes_downloaded = start;
    let mut last_progress = Instant::now();
    let attempt_start = Instant::now();
    let mut bytes_this_attempt = 0u64;

    let mut stream = response.bytes_stream();
    use futures_util::StreamExt;
    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|source| TransferError::network(&record.url, source))?;
        for piece in chunk.chunks(CHUNK_BYTES) {
            file.write_all(piece)
                .await
                .map_err(|source| TransferError::io(&temp_path, source))?;
            hasher.update(piece);
            bytes_downloaded += piece.len() as u64;
            bytes_this_attempt += piece.len() as u64;
        }

        if last_progress.elapsed() >= PROGRESS_INTERVAL {
            if let Some(callback) = progress {
                callback(record, bytes_downloaded, total_for_progress);
            }
            persist_progress(catalog, &record.url, bytes_downloaded).await;
            last_progress = Instant::now();
        }
    }
    file.flush()
        .await
        .map_err(|source| TransferError::io(&temp_path, source))?;
    if let Some(callback) = progress {
        callback(record, bytes_downloaded, total_for_progress);
    }
    persist_progress(catalog, &record.url, bytes_downloaded).await;

    if let Some(expected) = known_size {
        if bytes_downloaded != expected {
            return Err(TransferError::SizeMismatch {
                url: record.url.clone(),
                expected,
                actual: bytes_downloaded,
            });
        }
    }

    if verify_checksums {
        if let Some(expected) = &record.checksum {
            let actual = hex_digest(&hasher);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(TransferError::ChecksumMismatch {
                    url: record.url.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
    }

    publish(&temp_path, &final_path).await?;

    Ok(TransferOutcome {
        bytes_written_this_attempt: bytes_this_attempt,
        elapsed: attempt_start.elapsed(),
    })
}

/// Best-effort persistence of an in-progress `bytes_downloaded` count. A
/// failure here is logged, not propagated — the transfer itself must not
/// fail just because a progress write lost a race with a slow catalog.
async fn persist_progress(catalog: &Arc<dyn CatalogStore>, url: &str, bytes_downloaded: u64) {
    let update = StateUpdate { bytes_downloaded: Some(bytes_downloaded), ..StateUpdate::default() };
    if let Err(error) = catalog.update_state(url, &update).await {
        warn!(url, %error, "failed to persist download progress");
    }
}

fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Reads an existing `.part` file's current content into a running SHA-256.
/// Resuming a transfer must re-hash whatever is already on disk before
/// streaming the rest, or the final checksum would be wrong.
async fn prehash_existing(temp_path: &Path) -> Result<(u64, Sha256), TransferError> {
    let mut hasher = Sha256::new();
    let mut file = match File::open(temp_path).await {
        Ok(file) => file,
        Err(_) => return Ok((0, hasher)),
    };

    let mut buf = vec![0u8; CHUNK_BYTES];
    let mut total = 0u64;
    loop {
        let read = file
            .read(&mut buf)
            .await
            .map_err(|source| TransferError::io(temp_path, source))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        total += read as u64;
    }
    Ok((total, hasher))
}

/// Handles the 416 special case: success if the `.part` already matches the
/// known size, otherwise a terminal-for-this-attempt range refusal.
async fn finish_if_complete(
    temp_path: &Path,
    final_path: &Path,
    record: &FileRecord,
    observed_temp_size: u64,
    url: &str,
) -> Result<TransferOutcome, TransferError> {
    let matches_known_size = record.size.is_some_and(|expected| expected == observed_temp_size);
    if matches_known_size {
        publish(temp_path, final_path).await?;
        return Ok(TransferOutcome {
            bytes_written_this_attempt: 0,
            elapsed: Duration::ZERO,
        });
    }
    Err(TransferError::RangeRefused { url: url.to_string() })
}

async fn publish(temp_path: &Path, final_path: &Path) -> Result<(), TransferError> {
    fs::rename(temp_path, final_path)
        .await
        .map_err(|source| TransferError::io(final_path, source))?;
    debug!(path = %final_path.display(), "published");
    Ok(())
}

fn hex_digest(hasher: &Sha256) -> String {
    let digest = hasher.clone().finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogStore, FileRecord, SqliteCatalog};
    use crate::db::Database;
    use chrono::Utc;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(url: String, size: Option<u64>) -> FileRecord {
        let mut record =
            FileRecord::discovered(url, "game.zip".to_string(), size, String::new(), Utc::now());
        record.console = None;
        record
    }

    async fn memory_catalog() -> Arc<dyn CatalogStore> {
        let db = Database::new_in_memory().await.expect("in-memory db");
        Arc::new(SqliteCatalog::new(db))
    }

    #[tokio::test]
    async fn fresh_download_writes_and_publishes() {
        let server = MockServer::start().await;
        let body = b"hello world".to_vec();
        Mock::given(method("GET"))
            .and(path("/game.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let url = format!("{}/game.zip", server.uri());
        let rec = record(url, Some(body.len() as u64));
        let client = Client::new();
        let catalog = memory_catalog().await;
        catalog.upsert_discovery(&rec).await.unwrap();

        let outcome = transfer(&client, &rec, dir.path(), true, false, &catalog, None)
            .await
            .expect("transfer succeeds");
        assert_eq!(outcome.bytes_written_this_attempt, body.len() as u64);

        let published = local_path(dir.path(), &rec);
        let contents = tokio::fs::read(&published).await.unwrap();
        assert_eq!(contents, body);
        assert!(!temp_path_for(&published).exists());
    }

    #[tokio::test]
    async fn already_complete_file_is_a_no_op() {
        let dir = tempdir().unwrap();
        let rec = record("https://example.test/game.zip".to_string(), Some(5));
        let published = local_path(dir.path(), &rec);
        tokio::fs::create_dir_all(published.parent().unwrap()).await.unwrap();
        tokio::fs::write(&published, b"hello").await.unwrap();

        let client = Client::new();
        let catalog = memory_catalog().await;
        catalog.upsert_discovery(&rec).await.unwrap();
        let outcome = transfer(&client, &rec, dir.path(), true, false, &catalog, None)
            .await
            .expect("no-op success");
        assert_eq!(outcome.bytes_written_this_attempt, 0);
    }

    #[tokio::test]
    async fn checksum_mismatch_is_reported_and_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/game.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let url = format!("{}/game.zip", server.uri());
        let mut rec = record(url, Some(7));
        rec.checksum = Some("0".repeat(64));

        let client = Client::new();
        let catalog = memory_catalog().await;
        catalog.upsert_discovery(&rec).await.unwrap();
        let error = transfer(&client, &rec, dir.path(), true, true, &catalog, None)
            .await
            .expect_err("checksum must not match");
        assert!(matches!(error, TransferError::ChecksumMismatch { .. }));
        assert!(error.is_terminal());
    }

    #[tokio::test]
    async fn resume_sends_range_header_and_completes_hash_over_full_content() {
        use wiremock::matchers::header_exists;

        let server = MockServer::start().await;
        let full = b"0123456789ABCDEF".to_vec();
        Mock::given(method("GET"))
            .and(path("/game.zip"))
            .and(header_exists("range"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(full[8..].to_vec()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let url = format!("{}/game.zip", server.uri());
        let rec = record(url, Some(full.len() as u64));
        let published = local_path(dir.path(), &rec);
        let temp = temp_path_for(&published);
        tokio::fs::create_dir_all(temp.parent().unwrap()).await.unwrap();
        tokio::fs::write(&temp, &full[..8]).await.unwrap();

        let client = Client::new();
        let catalog = memory_catalog().await;
        catalog.upsert_discovery(&rec).await.unwrap();
        transfer(&client, &rec, dir.path(), true, false, &catalog, None)
            .await
            .expect("resume completes");

        let contents = tokio::fs::read(&published).await.unwrap();
        assert_eq!(contents, full);
    }

    #[tokio::test]
    async fn progress_is_persisted_to_catalog_mid_transfer() {
        let server = MockServer::start().await;
        let body = b"hello world".to_vec();
        Mock::given(method("GET"))
            .and(path("/game.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let url = format!("{}/game.zip", server.uri());
        let rec = record(url, None);
        let client = Client::new();
        let catalog = memory_catalog().await;
        catalog.upsert_discovery(&rec).await.unwrap();

        transfer(&client, &rec, dir.path(), true, false, &catalog, None)
            .await
            .expect("transfer succeeds");

        // The response's Content-Length was previously unknown to the
        // catalog; a successful transfer must have persisted it.
        let fetched = catalog.get(&rec.url).await.unwrap().unwrap();
        assert_eq!(fetched.size, Some(body.len() as u64));
        assert_eq!(fetched.bytes_downloaded, body.len() as u64);
    }
}
