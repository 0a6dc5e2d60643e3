//! Bounded-depth directory crawler.
//!
//! `Crawler::crawl` returns a lazy [`Stream`] of [`FileRecord`]s so a caller
//! can upsert each one into the catalog as it is discovered, without
//! buffering an entire archive tree in memory first.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use futures_util::Stream;
use glob::Pattern;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::catalog::FileRecord;
use crate::classify;
use crate::config::Config;
use crate::listing::{self, ListingEntry};

/// Errors surfaced by [`Crawler::crawl`] itself (as opposed to per-directory
/// failures, which are logged and swallowed).
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The crawl's starting URL could not be parsed.
    #[error("invalid start URL {url}: {source}")]
    InvalidStartUrl {
        /// The offending URL.
        url: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
}

/// Bounded-DFS crawler over an Apache/nginx-style autoindex tree.
///
/// Holds a shared HTTP client and the [`Config`] supplying include/exclude
/// globs and the size ceiling. `visited` is scoped to one [`Crawler::crawl`]
/// call — restarting a crawl re-fetches every listing.
#[derive(Debug, Clone)]
pub struct Crawler {
    client: Client,
    config: Arc<Config>,
}

struct CrawlState {
    client: Client,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    max_download_size: u64,
    visited: HashSet<String>,
    /// Stack of (directory URL, remaining depth) still to fetch. A `Vec`
    /// gives depth-first traversal order.
    stack: Vec<(String, u32)>,
    /// Files discovered in the directory currently being drained, emitted
    /// one at a time before the next directory is fetched.
    pending_files: VecDeque<FileRecord>,
}

impl Crawler {
    /// Builds a crawler over `client`, governed by `config`'s filters and
    /// size ceiling.
    #[must_use]
    pub fn new(client: Client, config: Arc<Config>) -> Self {
        Self { client, config }
    }

    /// Crawls starting at `start_url` down to `max_depth` directory levels,
    /// emitting one [`FileRecord`] per kept file as it is discovered.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::InvalidStartUrl`] only if `start_url` itself
    /// fails to parse; per-directory fetch/parse failures are logged and
    /// skipped, never terminating the stream.
    pub fn crawl(
        &self,
        start_url: &str,
        max_depth: u32,
    ) -> Result<impl Stream<Item = FileRecord> + use<>, CrawlError> {
        Url::parse(start_url).map_err(|source| CrawlError::InvalidStartUrl {
            url: start_url.to_string(),
            source,
        })?;

        let include = compile_patterns(&self.config.include_patterns);
        let exclude = compile_patterns(&self.config.exclude_patterns);

        let state = CrawlState {
            client: self.client.clone(),
            include,
            exclude,
            max_download_size: self.config.max_download_size,
            visited: HashSet::new(),
            stack: vec![(start_url.to_string(), max_depth)],
            pending_files: VecDeque::new(),
        };

        Ok(futures_util::stream::unfold(state, drive_crawl))
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|raw| match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(error) => {
                warn!(pattern = %raw, %error, "ignoring unparsable glob pattern");
                None
            }
        })
        .collect()
}

fn passes_filters(name: &str, size: Option<u64>, state: &CrawlState) -> bool {
    let include_ok = state.include.is_empty() || state.include.iter().any(|p| p.matches(name));
    let exclude_ok = !state.exclude.iter().any(|p| p.matches(name));
    let size_ok = size.is_none_or(|value| value <= state.max_download_size);
    include_ok && exclude_ok && size_ok
}

/// Single step of the crawl's state machine, used as the `unfold` driver.
///
/// Drains any buffered files first; once empty, fetches and parses the next
/// unvisited directory on the stack, buffering its kept files and pushing
/// its subdirectories (at `depth - 1`) before looping.
#[instrument(skip(state))]
async fn drive_crawl(mut state: CrawlState) -> Option<(FileRecord, CrawlState)> {
    loop {
        if let Some(file) = state.pending_files.pop_front() {
            return Some((file, state));
        }

        let (url, depth) = state.stack.pop()?;
        if depth == 0 || state.visited.contains(&url) {
            continue;
        }
        state.visited.insert(url.clone());

        match fetch_and_parse(&state.client, &url).await {
            Ok(entries) => {
                for entry in entries {
                    match entry {
                        ListingEntry::File { url: file_url, name, size } => {
                            if !passes_filters(&name, size, &state) {
                                continue;
                            }
                            let record = build_record(&file_url, &name, size, &url);
                            state.pending_files.push_back(record);
                        }
                        ListingEntry::Subdir { url: subdir_url } => {
                            if !state.visited.contains(&subdir_url) {
                                state.stack.push((subdir_url, depth - 1));
                            }
                        }
                    }
                }
            }
            Err(error) => {
                warn!(%url, %error, "directory fetch/parse failed, skipping");
            }
        }
    }
}

fn build_record(file_url: &str, name: &str, size: Option<u64>, directory_url: &str) -> FileRecord {
    let directory = Url::parse(directory_url).ok();
    let absolute = Url::parse(file_url).ok();
    let path = match (&absolute, &directory) {
        (Some(abs), Some(dir)) => classify::parent_path(abs, dir),
        _ => String::new(),
    };

    let mut record = FileRecord::discovered(
        file_url.to_string(),
        name.to_string(),
        size,
        path.clone(),
        Utc::now(),
    );
    record.console = classify::console(&path);
    record.region = classify::region(name);
    record.collection = classify::collection(&path);
    record
}

#[derive(Debug, Error)]
enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("parse failed: {0}")]
    Parse(#[from] crate::listing::ListingParseError),
}

async fn fetch_and_parse(client: &Client, url: &str) -> Result<Vec<ListingEntry>, FetchError> {
    let response = client.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;
    let entries = listing::parse(url, &bytes)?;
    debug!(%url, entries = entries.len(), "fetched directory listing");
    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> Arc<Config> {
        Arc::new(
            Config::builder()
                .base_url(base_url.to_string())
                .build()
                .expect("valid config"),
        )
    }

    #[tokio::test]
    async fn crawl_recurses_and_filters() {
        let server = MockServer::start().await;

        let root_html = format!(
            r#"<table>
                <tr><td><a href="Super%20Mario%20World.zip">Super Mario World.zip</a></td><td>512K</td></tr>
                <tr><td><a href="BIOS_file.zip">BIOS_file.zip</a></td><td>1K</td></tr>
                <tr><td><a href="sub/">sub/</a></td><td>-</td></tr>
            </table>"#
        );
        Mock::given(method("GET"))
            .and(path("/files/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(root_html))
            .mount(&server)
            .await;

        let sub_html = r#"<table>
            <tr><td><a href="Disc.iso">Disc.iso</a></td><td>2K</td></tr>
        </table>"#;
        Mock::given(method("GET"))
            .and(path("/files/sub/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sub_html))
            .mount(&server)
            .await;

        let base_url = format!("{}/files/", server.uri());
        let mut config = Config::builder()
            .base_url(base_url.clone())
            .include_patterns(vec!["*.zip".to_string()])
            .exclude_patterns(vec!["*BIOS*".to_string()])
            .build()
            .expect("valid config");
        config.max_download_size = u64::MAX;

        let crawler = Crawler::new(Client::new(), Arc::new(config));
        let stream = crawler.crawl(&base_url, 3).expect("valid start url");
        let records: Vec<_> = stream.collect().await;

        assert_eq!(records.len(), 1, "only the non-BIOS zip should survive the filter");
        assert_eq!(records[0].name, "Super Mario World.zip");
        assert_eq!(records[0].size, Some(524_288));
    }

    #[tokio::test]
    async fn crawl_continues_past_a_broken_subdirectory() {
        let server = MockServer::start().await;

        let root_html = r#"<table>
            <tr><td><a href="broken/">broken/</a></td><td>-</td></tr>
            <tr><td><a href="good.zip">good.zip</a></td><td>1K</td></tr>
        </table>"#;
        Mock::given(method("GET"))
            .and(path("/files/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(root_html))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/broken/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let base_url = format!("{}/files/", server.uri());
        let crawler = Crawler::new(Client::new(), test_config(&base_url));
        let stream = crawler.crawl(&base_url, 3).expect("valid start url");
        let records: Vec<_> = stream.collect().await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "good.zip");
    }

    #[tokio::test]
    async fn crawl_respects_max_depth_zero() {
        let crawler = Crawler::new(Client::new(), test_config("https://example.test/"));
        let stream = crawler
            .crawl("https://example.test/files/", 0)
            .expect("valid start url");
        let records: Vec<FileRecord> = stream.collect().await;
        assert!(records.is_empty());
    }
}
