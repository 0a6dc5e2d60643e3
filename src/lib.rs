//! Archivist Core Library
//!
//! This library provides the core pipeline for crawling a hierarchical HTTP
//! file archive (Apache/nginx autoindex style), classifying and cataloging
//! what it finds, and resumably downloading the result — plus a search
//! engine over the resulting catalog.
//!
//! # Architecture
//!
//! The library is organized around the data flow described in the design
//! document: the [`crawl::Crawler`] discovers files and feeds them through
//! [`classify`] into the [`catalog`], the [`download::DownloadEngine`] reads
//! pending records back out and fetches them under [`governance`]'s
//! politeness limits, and [`search`] answers fuzzy/field-tagged queries over
//! the same catalog.
//!
//! - [`catalog`] - the durable, URL-keyed `FileRecord` store
//! - [`classify`] - console/region/collection/format derivation
//! - [`config`] - process configuration and validation
//! - [`crawl`] - bounded-depth directory crawler
//! - [`db`] - SQLite connection pooling and migrations
//! - [`download`] - resumable transfer engine with retry/backoff
//! - [`governance`] - per-host rate limiting and concurrency gating
//! - [`http_client`] - the process-wide shared `reqwest::Client`
//! - [`listing`] - autoindex HTML table parsing
//! - [`search`] - fuzzy/substring/field-tagged catalog search
//! - [`torrentzip`] - advisory TorrentZip trailing-comment inspection

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod classify;
pub mod config;
pub mod crawl;
pub mod db;
pub mod download;
pub mod governance;
pub mod http_client;
pub mod listing;
pub mod search;
pub mod torrentzip;

pub use catalog::{
    CatalogError, CatalogStats, CatalogStore, Collection, DownloadStatus, FileFormat, FileRecord,
    ListFilter, SqliteCatalog, StateUpdate, UpsertOutcome,
};
pub use config::{Config, ConfigBuilder, ConfigError};
pub use crawl::{CrawlError, Crawler};
pub use db::{Database, DbError};
pub use download::{
    BatchOutcome, DownloadEngine, DownloadResult, EngineError, FailureType, ProgressCallback,
    RetryDecision, TransferError, classify_error, should_retry,
};
pub use governance::{ConcurrencyGate, DownloadPermit, HostRateLimiter, host_key};
pub use http_client::HttpClientError;
pub use listing::{ListingEntry, ListingParseError};
pub use search::{MatchType, SearchResult, normalize, search, suggest};
pub use torrentzip::TorrentZipMarker;
