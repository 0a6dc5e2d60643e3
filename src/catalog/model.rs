//! The central `FileRecord` entity and its supporting enums.

use chrono::{DateTime, Utc};

/// Download lifecycle state for one `FileRecord`.
///
/// `pending -> downloading -> {completed | failed | paused}`, with `failed`
/// able to re-enter `downloading` on a subsequent attempt. The engine never
/// transitions a record into `paused` itself; that is an externally-set,
/// terminal-until-resumed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadStatus {
    /// Discovered but not yet attempted.
    Pending,
    /// An attempt is currently in flight.
    Downloading,
    /// Transfer finished and was verified; file is published at `local_path`.
    Completed,
    /// All retry attempts were exhausted, or a terminal error occurred.
    Failed,
    /// Externally paused; the engine will not touch it until resumed.
    Paused,
}

impl DownloadStatus {
    /// The lowercase name used as the on-disk/wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }

    /// Parses the on-disk representation back into a status.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "downloading" => Some(Self::Downloading),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

/// A curation group within the upstream archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    NoIntro,
    Redump,
    Mame,
    Tosec,
    FinalBurnNeo,
    TeknoParrot,
    Hbmame,
    TotalDos,
    Laserdisc,
    LostLevels,
    Htgd,
    RetroAchievements,
    TEn,
    Touhou,
    EggmansArcade,
    InternetArchive,
    Miscellaneous,
    Bitsavers,
    Exo,
    /// Default when no recognizable collection segment is found.
    Unknown,
}

impl Collection {
    /// The table of (path-segment needle, collection) pairs consulted by the
    /// classifier, checked in order against a lowercased path segment.
    const TABLE: &'static [(&'static str, Collection)] = &[
        ("no-intro", Collection::NoIntro),
        ("redump", Collection::Redump),
        ("mame", Collection::Mame),
        ("tosec", Collection::Tosec),
        ("finalburn neo", Collection::FinalBurnNeo),
        ("fbneo", Collection::FinalBurnNeo),
        ("teknoparrot", Collection::TeknoParrot),
        ("hbmame", Collection::Hbmame),
        ("total dos", Collection::TotalDos),
        ("laserdisc", Collection::Laserdisc),
        ("lost levels", Collection::LostLevels),
        ("htgd", Collection::Htgd),
        ("retroachievements", Collection::RetroAchievements),
        ("t-en", Collection::TEn),
        ("touhou", Collection::Touhou),
        ("eggman", Collection::EggmansArcade),
        ("internet archive", Collection::InternetArchive),
        ("miscellaneous", Collection::Miscellaneous),
        ("bitsavers", Collection::Bitsavers),
        ("exo", Collection::Exo),
    ];

    /// Matches a single lowercased path segment against the known table.
    #[must_use]
    pub fn match_segment(segment_lower: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(needle, _)| segment_lower.contains(needle))
            .map(|(_, collection)| *collection)
    }

    /// Display name, also used as the catalog's stored string value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoIntro => "No-Intro",
            Self::Redump => "Redump",
            Self::Mame => "MAME",
            Self::Tosec => "TOSEC",
            Self::FinalBurnNeo => "FinalBurn Neo",
            Self::TeknoParrot => "TeknoParrot",
            Self::Hbmame => "HBMAME",
            Self::TotalDos => "Total DOS",
            Self::Laserdisc => "Laserdisc",
            Self::LostLevels => "Lost Levels",
            Self::Htgd => "HTGD",
            Self::RetroAchievements => "RetroAchievements",
            Self::TEn => "T-En",
            Self::Touhou => "Touhou",
            Self::EggmansArcade => "Eggman's Arcade",
            Self::InternetArchive => "Internet Archive",
            Self::Miscellaneous => "Miscellaneous",
            Self::Bitsavers => "Bitsavers",
            Self::Exo => "eXo",
            Self::Unknown => "Unknown",
        }
    }

    /// Parses the stored string value back into a `Collection`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        Self::TABLE
            .iter()
            .find(|(_, collection)| collection.as_str() == value)
            .map_or(Self::Unknown, |(_, collection)| *collection)
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Recognized archive-file container/image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Zip,
    SevenZip,
    Rar,
    Iso,
    Bin,
    Rvz,
    Wux,
    Chd,
    Gcz,
    Wbfs,
    Other,
}

impl FileFormat {
    /// Maps a lowercased filename extension (no leading dot) to a format.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "zip" => Self::Zip,
            "7z" => Self::SevenZip,
            "rar" => Self::Rar,
            "iso" => Self::Iso,
            "bin" => Self::Bin,
            "rvz" => Self::Rvz,
            "wux" => Self::Wux,
            "chd" => Self::Chd,
            "gcz" => Self::Gcz,
            "wbfs" => Self::Wbfs,
            _ => Self::Other,
        }
    }

    /// Whether files of this format require client-side conversion before
    /// use: `rvz`/`wux` wrap a different underlying disc format.
    #[must_use]
    pub fn requires_conversion(self) -> bool {
        matches!(self, Self::Rvz | Self::Wux)
    }

    /// The stored string value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::SevenZip => "7z",
            Self::Rar => "rar",
            Self::Iso => "iso",
            Self::Bin => "bin",
            Self::Rvz => "rvz",
            Self::Wux => "wux",
            Self::Chd => "chd",
            Self::Gcz => "gcz",
            Self::Wbfs => "wbfs",
            Self::Other => "other",
        }
    }

    /// Parses the stored string value back into a `FileFormat`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        Self::from_extension(value)
    }
}

/// The central entity: one discovered/downloadable file.
///
/// Identity is `url`. Discovery fields are written by the crawler via
/// [`crate::catalog::CatalogStore::upsert_discovery`]; download-state fields
/// are written by the download engine via
/// [`crate::catalog::CatalogStore::update_state`]. The two halves are never
/// clobbered by each other's writer.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    // --- identity ---
    /// Globally unique; the catalog's primary key.
    pub url: String,

    // --- discovery ---
    /// Filename as it appears in the listing.
    pub name: String,
    /// Size in bytes, if known at discovery time.
    pub size: Option<u64>,
    /// Host-relative logical path (base URL's path stripped, trimmed of slashes).
    pub parent_path: String,
    /// Lowercased filename extension, e.g. `"zip"`.
    pub file_type: String,
    /// Derived console/platform name, if recognized.
    pub console: Option<String>,
    /// Derived region tag, if the filename carries one.
    pub region: Option<String>,
    /// Curation group this file belongs to (always defined; defaults to
    /// `Unknown`).
    pub collection: Collection,
    /// How often the source collection is refreshed upstream, if known.
    pub collection_update_frequency: Option<String>,
    /// Archive/image container format.
    pub file_format: FileFormat,
    /// True when `file_format` needs client-side conversion before use.
    pub requires_conversion: bool,
    /// True when the ZIP's trailing comment carried a `TORRENTZIPPED-` marker.
    pub is_torrentzipped: bool,
    /// 8 hex-digit CRC-32 captured from that marker; advisory only, never
    /// computed or verified against the archive's actual contents.
    pub torrentzip_crc32: Option<String>,
    /// Expected checksum, if the upstream catalog publishes one.
    pub checksum: Option<String>,
    /// Algorithm the `checksum` field is expressed in (normally `"sha256"`).
    pub checksum_type: Option<String>,
    /// `Last-Modified` as reported by the server, if any.
    pub last_modified: Option<DateTime<Utc>>,
    /// `ETag` as reported by the server, if any.
    pub etag: Option<String>,
    /// Heuristic: discovered within a short recency window of the crawl.
    pub is_recent_upload: bool,

    // --- download state ---
    /// Current lifecycle state.
    pub status: DownloadStatus,
    /// Final on-disk path once published.
    pub local_path: Option<String>,
    /// Bytes written so far in the current/most-recent attempt; never
    /// exceeds `size` when `size` is known.
    pub bytes_downloaded: u64,
    /// Number of attempts made so far (1-based once an attempt has started).
    pub download_attempts: u32,
    /// Human-readable failure detail, if `status == Failed`.
    pub error_message: Option<String>,
    /// When the record was first discovered.
    pub added_at: DateTime<Utc>,
    /// When the transfer completed successfully.
    pub completed_at: Option<DateTime<Utc>>,
    /// Average transfer rate over the most recent attempt, bytes/sec.
    pub average_download_speed: Option<f64>,
    /// Heuristic: the host appears to be throttling this transfer.
    pub is_speed_limited: bool,
}

impl FileRecord {
    /// Constructs a freshly-discovered record in the `pending` state with
    /// all download-state fields at their zero value, as produced by the
    /// crawler on first discovery.
    #[must_use]
    pub fn discovered(
        url: String,
        name: String,
        size: Option<u64>,
        parent_path: String,
        added_at: DateTime<Utc>,
    ) -> Self {
        let file_type = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        let file_format = FileFormat::from_extension(&file_type);
        Self {
            url,
            name,
            size,
            parent_path,
            file_type,
            console: None,
            region: None,
            collection: Collection::Unknown,
            collection_update_frequency: None,
            file_format,
            requires_conversion: file_format.requires_conversion(),
            is_torrentzipped: false,
            torrentzip_crc32: None,
            checksum: None,
            checksum_type: None,
            last_modified: None,
            etag: None,
            is_recent_upload: false,
            status: DownloadStatus::Pending,
            local_path: None,
            bytes_downloaded: 0,
            download_attempts: 0,
            error_message: None,
            added_at,
            completed_at: None,
            average_download_speed: None,
            is_speed_limited: false,
        }
    }
}
