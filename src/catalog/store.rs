//! Durable URL-keyed catalog store.
//!
//! A single-file embedded relational store is the natural fit here — the
//! same posture [`crate::db::Database`] already takes for connection
//! pooling, WAL mode, and busy-timeout handling. [`CatalogStore`] is the
//! interface the rest of the crate depends on; [`SqliteCatalog`] is the one
//! concrete implementation shipped here, but any backend satisfying the
//! trait is acceptable.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::model::{Collection, DownloadStatus, FileFormat, FileRecord};
use crate::db::Database;

/// Errors raised by a [`CatalogStore`] implementation.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The underlying database returned an error.
    #[error("catalog database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of [`CatalogStore::upsert_discovery`]: whether the URL was new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The URL had not been seen before; a new row was inserted.
    Added,
    /// The URL already existed; discovery fields were refreshed in place.
    Updated,
}

/// Subset-of-field filter accepted by [`CatalogStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Restrict to records in this status.
    pub status: Option<DownloadStatus>,
    /// Restrict to records with this console.
    pub console: Option<String>,
    /// Restrict to records in this collection.
    pub collection: Option<Collection>,
    /// Maximum rows to return.
    pub limit: Option<i64>,
    /// Rows to skip before the first returned row.
    pub offset: Option<i64>,
}

/// Download-state-only patch applied by [`CatalogStore::update_state`].
///
/// Every field is optional; `None` means "leave the stored value alone".
/// Discovery fields are never touched by this call, mirroring the
/// crawler/engine split of ownership over a record's lifecycle.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub status: Option<DownloadStatus>,
    pub local_path: Option<Option<String>>,
    pub bytes_downloaded: Option<u64>,
    /// The file's total size, learned mid-transfer from a `Content-Length`
    /// header when the catalog did not already have one from discovery.
    pub size: Option<u64>,
    pub download_attempts: Option<u32>,
    pub error_message: Option<Option<String>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub average_download_speed: Option<Option<f64>>,
    pub is_speed_limited: Option<bool>,
    pub is_torrentzipped: Option<bool>,
    pub torrentzip_crc32: Option<Option<String>>,
}

/// Aggregate statistics over the whole catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogStats {
    /// Row count per `status` value.
    pub status_counts: HashMap<String, i64>,
    /// Sum of `size` across every record where it is known.
    pub total_size: u64,
    /// Sum of `bytes_downloaded` across every record.
    pub downloaded_bytes: u64,
    /// Row count per `console` value (missing console excluded).
    pub console_counts: HashMap<String, i64>,
}

/// Contract for the URL-keyed catalog.
///
/// Implementations must serialize conflicting writes to the same URL; a
/// failed insert due to a unique-URL collision is not an error (callers
/// distinguish via [`UpsertOutcome`]).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Inserts a newly-discovered record, or refreshes discovery fields on
    /// an existing one while preserving its download-state fields.
    async fn upsert_discovery(&self, record: &FileRecord) -> Result<UpsertOutcome, CatalogError>;

    /// Writes only the download-state fields named in `update`.
    async fn update_state(&self, url: &str, update: &StateUpdate) -> Result<(), CatalogError>;

    /// Fetches one record by URL.
    async fn get(&self, url: &str) -> Result<Option<FileRecord>, CatalogError>;

    /// Lists records matching `filter`, newest-discovered first by default.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<FileRecord>, CatalogError>;

    /// Case-insensitive substring search over `name`.
    async fn search_by_name_substring(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<FileRecord>, CatalogError>;

    /// Every distinct non-null `console` value.
    async fn distinct_consoles(&self) -> Result<Vec<String>, CatalogError>;

    /// Every distinct `collection` value present in the catalog.
    async fn distinct_collections(&self) -> Result<Vec<String>, CatalogError>;

    /// Records belonging to `collection`, optionally capped at `limit`.
    async fn games_by_collection(
        &self,
        collection: Collection,
        limit: Option<i64>,
    ) -> Result<Vec<FileRecord>, CatalogError>;

    /// Aggregate counts/sums over the whole catalog.
    async fn stats(&self) -> Result<CatalogStats, CatalogError>;
}

/// [`CatalogStore`] backed by the embedded SQLite database in
/// [`crate::db::Database`].
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    db: Database,
}

impl SqliteCatalog {
    /// Wraps an already-open [`Database`].
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Resets any row left `downloading` from a prior process back to
    /// `pending`. Call this once after opening the database, before the
    /// download engine or crawler touch the catalog.
    #[instrument(skip(self))]
    pub async fn recover_incomplete(&self) -> Result<u64, CatalogError> {
        let result = sqlx::query(
            "UPDATE game_files SET status = 'pending' WHERE status = 'downloading'",
        )
        .execute(self.db.pool())
        .await?;
        let recovered = result.rows_affected();
        if recovered > 0 {
            warn!(recovered, "reset stale downloading rows to pending on startup");
        }
        Ok(recovered)
    }
}

fn row_to_record(row: &SqliteRow) -> Result<FileRecord, sqlx::Error> {
    let collection: String = row.try_get("collection")?;
    let file_format: String = row.try_get("file_format")?;
    let status: String = row.try_get("status")?;
    let status = DownloadStatus::parse(&status).unwrap_or(DownloadStatus::Pending);
    let size: Option<i64> = row.try_get("size")?;
    let bytes_downloaded: i64 = row.try_get("bytes_downloaded")?;
    let download_attempts: i64 = row.try_get("download_attempts")?;

    Ok(FileRecord {
        url: row.try_get("url")?,
        name: row.try_get("name")?,
        size: size.map(|value| value.max(0) as u64),
        parent_path: row.try_get("parent_path")?,
        file_type: row.try_get("file_type")?,
        console: row.try_get("console")?,
        region: row.try_get("region")?,
        collection: Collection::parse(&collection),
        collection_update_frequency: row.try_get("collection_update_frequency")?,
        file_format: FileFormat::parse(&file_format),
        requires_conversion: row.try_get("requires_conversion")?,
        is_torrentzipped: row.try_get("is_torrentzipped")?,
        torrentzip_crc32: row.try_get("torrentzip_crc32")?,
        checksum: row.try_get("checksum")?,
        checksum_type: row.try_get("checksum_type")?,
        last_modified: row.try_get("last_modified")?,
        etag: row.try_get("etag")?,
        is_recent_upload: row.try_get("is_recent_upload")?,
        status,
        local_path: row.try_get("local_path")?,
        bytes_downloaded: bytes_downloaded.max(0) as u64,
        download_attempts: download_attempts.max(0) as u32,
        error_message: row.try_get("error_message")?,
        added_at: row.try_get("added_at")?,
        completed_at: row.try_get("completed_at")?,
        average_download_speed: row.try_get("average_download_speed")?,
        is_speed_limited: row.try_get("is_speed_limited")?,
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    #[instrument(skip(self, record), fields(url = %record.url))]
    async fn upsert_discovery(&self, record: &FileRecord) -> Result<UpsertOutcome, CatalogError> {
        let existing = sqlx::query("SELECT url FROM game_files WHERE url = ?")
            .bind(&record.url)
            .fetch_optional(self.db.pool())
            .await?;

        if existing.is_some() {
            sqlx::query(
                "UPDATE game_files SET
                    name = ?, size = ?, parent_path = ?, file_type = ?, console = ?,
                    region = ?, collection = ?, collection_update_frequency = ?,
                    file_format = ?, requires_conversion = ?, is_torrentzipped = ?,
                    torrentzip_crc32 = ?, checksum = ?, checksum_type = ?,
                    last_modified = ?, etag = ?, is_recent_upload = ?
                 WHERE url = ?",
            )
            .bind(&record.name)
            .bind(record.size.map(|value| value as i64))
            .bind(&record.parent_path)
            .bind(&record.file_type)
            .bind(&record.console)
            .bind(&record.region)
            .bind(record.collection.as_str())
            .bind(&record.collection_update_frequency)
            .bind(record.file_format.as_str())
            .bind(record.requires_conversion)
            .bind(record.is_torrentzipped)
            .bind(&record.torrentzip_crc32)
            .bind(&record.checksum)
            .bind(&record.checksum_type)
            .bind(record.last_modified)
            .bind(&record.etag)
            .bind(record.is_recent_upload)
            .bind(&record.url)
            .execute(self.db.pool())
            .await?;
            Ok(UpsertOutcome::Updated)
        } else {
            sqlx::query(
                "INSERT INTO game_files (
                    url, name, size, parent_path, file_type, console, region,
                    collection, collection_update_frequency, file_format,
                    requires_conversion, is_torrentzipped, torrentzip_crc32,
                    checksum, checksum_type, last_modified, etag, is_recent_upload,
                    status, local_path, bytes_downloaded, download_attempts,
                    error_message, added_at, completed_at, average_download_speed,
                    is_speed_limited
                 ) VALUES (
                    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                    ?, ?, ?, ?, ?, ?, ?, ?, ?
                 )",
            )
            .bind(&record.url)
            .bind(&record.name)
            .bind(record.size.map(|value| value as i64))
            .bind(&record.parent_path)
            .bind(&record.file_type)
            .bind(&record.console)
            .bind(&record.region)
            .bind(record.collection.as_str())
            .bind(&record.collection_update_frequency)
            .bind(record.file_format.as_str())
            .bind(record.requires_conversion)
            .bind(record.is_torrentzipped)
            .bind(&record.torrentzip_crc32)
            .bind(&record.checksum)
            .bind(&record.checksum_type)
            .bind(record.last_modified)
            .bind(&record.etag)
            .bind(record.is_recent_upload)
            .bind(record.status.as_str())
            .bind(&record.local_path)
            .bind(record.bytes_downloaded as i64)
            .bind(record.download_attempts as i64)
            .bind(&record.error_message)
            .bind(record.added_at)
            .bind(record.completed_at)
            .bind(record.average_download_speed)
            .bind(record.is_speed_limited)
            .execute(self.db.pool())
            .await?;
            Ok(UpsertOutcome::Added)
        }
    }

    #[instrument(skip(self, update), fields(url = %url))]
    async fn update_state(&self, url: &str, update: &StateUpdate) -> Result<(), CatalogError> {
        // SQLite has no partial-UPDATE-by-field primitive, so COALESCE each
        // column against a bound value that is NULL when the caller left it
        // unset — this keeps the write a single statement per call.
        sqlx::query(
            "UPDATE game_files SET
                status = COALESCE(?, status),
                local_path = CASE WHEN ? THEN ? ELSE local_path END,
                bytes_downloaded = COALESCE(?, bytes_downloaded),
                size = COALESCE(?, size),
                download_attempts = COALESCE(?, download_attempts),
                error_message = CASE WHEN ? THEN ? ELSE error_message END,
                completed_at = CASE WHEN ? THEN ? ELSE completed_at END,
                average_download_speed = CASE WHEN ? THEN ? ELSE average_download_speed END,
                is_speed_limited = COALESCE(?, is_speed_limited),
                is_torrentzipped = COALESCE(?, is_torrentzipped),
                torrentzip_crc32 = CASE WHEN ? THEN ? ELSE torrentzip_crc32 END
             WHERE url = ?",
        )
        .bind(update.status.map(DownloadStatus::as_str))
        .bind(update.local_path.is_some())
        .bind(update.local_path.clone().flatten())
        .bind(update.bytes_downloaded.map(|value| value as i64))
        .bind(update.size.map(|value| value as i64))
        .bind(update.download_attempts.map(|value| value as i64))
        .bind(update.error_message.is_some())
        .bind(update.error_message.clone().flatten())
        .bind(update.completed_at.is_some())
        .bind(update.completed_at.flatten())
        .bind(update.average_download_speed.is_some())
        .bind(update.average_download_speed.flatten())
        .bind(update.is_speed_limited)
        .bind(update.is_torrentzipped)
        .bind(update.torrentzip_crc32.is_some())
        .bind(update.torrentzip_crc32.clone().flatten())
        .bind(url)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<Option<FileRecord>, CatalogError> {
        let row = sqlx::query("SELECT * FROM game_files WHERE url = ?")
            .bind(url)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(row_to_record).transpose().map_err(Into::into)
    }

    #[instrument(skip(self, filter))]
    async fn list(&self, filter: &ListFilter) -> Result<Vec<FileRecord>, CatalogError> {
        let mut sql = String::from("SELECT * FROM game_files WHERE 1=1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.console.is_some() {
            sql.push_str(" AND console = ?");
        }
        if filter.collection.is_some() {
            sql.push_str(" AND collection = ?");
        }
        sql.push_str(" ORDER BY added_at DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        if filter.offset.is_some() {
            sql.push_str(" OFFSET ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(console) = &filter.console {
            query = query.bind(console);
        }
        if let Some(collection) = filter.collection {
            query = query.bind(collection.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }
        if let Some(offset) = filter.offset {
            query = query.bind(offset);
        }

        let rows = query.fetch_all(self.db.pool()).await?;
        rows.iter().map(row_to_record).collect::<Result<_, _>>().map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn search_by_name_substring(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<FileRecord>, CatalogError> {
        let pattern = format!("%{}%", query.to_lowercase());
        let rows = sqlx::query(
            "SELECT * FROM game_files WHERE LOWER(name) LIKE ? ORDER BY added_at DESC LIMIT ?",
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(row_to_record).collect::<Result<_, _>>().map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn distinct_consoles(&self) -> Result<Vec<String>, CatalogError> {
        let rows = sqlx::query(
            "SELECT DISTINCT console FROM game_files WHERE console IS NOT NULL ORDER BY console",
        )
        .fetch_all(self.db.pool())
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("console"))
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn distinct_collections(&self) -> Result<Vec<String>, CatalogError> {
        let rows = sqlx::query("SELECT DISTINCT collection FROM game_files ORDER BY collection")
            .fetch_all(self.db.pool())
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("collection"))
            .collect::<Result<_, _>>()
            .map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn games_by_collection(
        &self,
        collection: Collection,
        limit: Option<i64>,
    ) -> Result<Vec<FileRecord>, CatalogError> {
        self.list(&ListFilter {
            collection: Some(collection),
            limit,
            ..ListFilter::default()
        })
        .await
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let mut stats = CatalogStats::default();

        let status_rows =
            sqlx::query("SELECT status, COUNT(*) AS n FROM game_files GROUP BY status")
                .fetch_all(self.db.pool())
                .await?;
        for row in &status_rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("n")?;
            stats.status_counts.insert(status, count);
        }

        let console_rows = sqlx::query(
            "SELECT console, COUNT(*) AS n FROM game_files WHERE console IS NOT NULL GROUP BY console",
        )
        .fetch_all(self.db.pool())
        .await?;
        for row in &console_rows {
            let console: String = row.try_get("console")?;
            let count: i64 = row.try_get("n")?;
            stats.console_counts.insert(console, count);
        }

        let totals = sqlx::query(
            "SELECT COALESCE(SUM(size), 0) AS total_size,
                    COALESCE(SUM(bytes_downloaded), 0) AS downloaded_bytes
             FROM game_files",
        )
        .fetch_one(self.db.pool())
        .await?;
        let total_size: i64 = totals.try_get("total_size")?;
        let downloaded_bytes: i64 = totals.try_get("downloaded_bytes")?;
        stats.total_size = total_size.max(0) as u64;
        stats.downloaded_bytes = downloaded_bytes.max(0) as u64;

        info!(
            statuses = stats.status_counts.len(),
            consoles = stats.console_counts.len(),
            "computed catalog stats"
        );
        Ok(stats)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn memory_catalog() -> SqliteCatalog {
        let db = Database::new_in_memory().await.expect("in-memory db");
        SqliteCatalog::new(db)
    }

    fn sample_record(url: &str) -> FileRecord {
        FileRecord::discovered(
            url.to_string(),
            "Super Mario World (USA).zip".to_string(),
            Some(524_288),
            "No-Intro/Nintendo - Super Nintendo Entertainment System".to_string(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn upsert_discovery_inserts_then_updates() {
        let catalog = memory_catalog().await;
        let record = sample_record("https://example.test/a.zip");

        let first = catalog.upsert_discovery(&record).await.unwrap();
        assert_eq!(first, UpsertOutcome::Added);

        let second = catalog.upsert_discovery(&record).await.unwrap();
        assert_eq!(second, UpsertOutcome::Updated);

        let rows = catalog.list(&ListFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1, "re-discovery must not duplicate the URL");
    }

    #[tokio::test]
    async fn upsert_discovery_preserves_download_state() {
        let catalog = memory_catalog().await;
        let record = sample_record("https://example.test/b.zip");
        catalog.upsert_discovery(&record).await.unwrap();

        catalog
            .update_state(
                &record.url,
                &StateUpdate {
                    status: Some(DownloadStatus::Downloading),
                    bytes_downloaded: Some(1024),
                    download_attempts: Some(1),
                    ..StateUpdate::default()
                },
            )
            .await
            .unwrap();

        // A re-discovery (e.g. a second crawl pass) must not clobber state.
        catalog.upsert_discovery(&record).await.unwrap();

        let fetched = catalog.get(&record.url).await.unwrap().unwrap();
        assert_eq!(fetched.status, DownloadStatus::Downloading);
        assert_eq!(fetched.bytes_downloaded, 1024);
    }

    #[tokio::test]
    async fn update_state_leaves_unset_fields_untouched() {
        let catalog = memory_catalog().await;
        let record = sample_record("https://example.test/c.zip");
        catalog.upsert_discovery(&record).await.unwrap();

        catalog
            .update_state(
                &record.url,
                &StateUpdate {
                    bytes_downloaded: Some(100),
                    ..StateUpdate::default()
                },
            )
            .await
            .unwrap();
        catalog
            .update_state(
                &record.url,
                &StateUpdate {
                    bytes_downloaded: Some(200),
                    ..StateUpdate::default()
                },
            )
            .await
            .unwrap();

        let fetched = catalog.get(&record.url).await.unwrap().unwrap();
        assert_eq!(fetched.bytes_downloaded, 200);
        assert_eq!(fetched.status, DownloadStatus::Pending);
    }

    #[tokio::test]
    async fn list_filters_by_status_and_console() {
        let catalog = memory_catalog().await;
        let mut a = sample_record("https://example.test/d.zip");
        a.console = Some("SNES".to_string());
        let mut b = sample_record("https://example.test/e.zip");
        b.console = Some("Genesis".to_string());

        catalog.upsert_discovery(&a).await.unwrap();
        catalog.upsert_discovery(&b).await.unwrap();
        catalog
            .update_state(
                &a.url,
                &StateUpdate {
                    status: Some(DownloadStatus::Completed),
                    ..StateUpdate::default()
                },
            )
            .await
            .unwrap();

        let completed = catalog
            .list(&ListFilter {
                status: Some(DownloadStatus::Completed),
                ..ListFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].url, a.url);

        let snes = catalog
            .list(&ListFilter {
                console: Some("SNES".to_string()),
                ..ListFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(snes.len(), 1);
        assert_eq!(snes[0].url, a.url);
    }

    #[tokio::test]
    async fn search_by_name_substring_is_case_insensitive() {
        let catalog = memory_catalog().await;
        catalog
            .upsert_discovery(&sample_record("https://example.test/f.zip"))
            .await
            .unwrap();

        let hits = catalog.search_by_name_substring("MARIO", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn stats_aggregate_sizes_and_counts() {
        let catalog = memory_catalog().await;
        let mut a = sample_record("https://example.test/g.zip");
        a.console = Some("SNES".to_string());
        catalog.upsert_discovery(&a).await.unwrap();
        catalog
            .update_state(
                &a.url,
                &StateUpdate {
                    bytes_downloaded: Some(524_288),
                    status: Some(DownloadStatus::Completed),
                    ..StateUpdate::default()
                },
            )
            .await
            .unwrap();

        let stats = catalog.stats().await.unwrap();
        assert_eq!(stats.total_size, 524_288);
        assert_eq!(stats.downloaded_bytes, 524_288);
        assert_eq!(stats.console_counts.get("SNES"), Some(&1));
        assert_eq!(stats.status_counts.get("completed"), Some(&1));
    }

    #[tokio::test]
    async fn update_state_writes_torrentzip_fields() {
        let catalog = memory_catalog().await;
        let record = sample_record("https://example.test/i.zip");
        catalog.upsert_discovery(&record).await.unwrap();

        catalog
            .update_state(
                &record.url,
                &StateUpdate {
                    is_torrentzipped: Some(true),
                    torrentzip_crc32: Some(Some("DEADBEEF".to_string())),
                    ..StateUpdate::default()
                },
            )
            .await
            .unwrap();

        let fetched = catalog.get(&record.url).await.unwrap().unwrap();
        assert!(fetched.is_torrentzipped);
        assert_eq!(fetched.torrentzip_crc32.as_deref(), Some("DEADBEEF"));
    }

    #[tokio::test]
    async fn update_state_writes_newly_learned_size() {
        let catalog = memory_catalog().await;
        let mut record = sample_record("https://example.test/j.zip");
        record.size = None;
        catalog.upsert_discovery(&record).await.unwrap();

        catalog
            .update_state(
                &record.url,
                &StateUpdate {
                    size: Some(524_288),
                    ..StateUpdate::default()
                },
            )
            .await
            .unwrap();

        let fetched = catalog.get(&record.url).await.unwrap().unwrap();
        assert_eq!(fetched.size, Some(524_288));
    }

    #[tokio::test]
    async fn recover_incomplete_resets_downloading_to_pending() {
        let catalog = memory_catalog().await;
        let record = sample_record("https://example.test/h.zip");
        catalog.upsert_discovery(&record).await.unwrap();
        catalog
            .update_state(
                &record.url,
                &StateUpdate {
                    status: Some(DownloadStatus::Downloading),
                    ..StateUpdate::default()
                },
            )
            .await
            .unwrap();

        let recovered = catalog.recover_incomplete().await.unwrap();
        assert_eq!(recovered, 1);

        let fetched = catalog.get(&record.url).await.unwrap().unwrap();
        assert_eq!(fetched.status, DownloadStatus::Pending);
    }
}
