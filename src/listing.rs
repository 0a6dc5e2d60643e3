//! HTML autoindex listing parser.
//!
//! `parse` is a pure function: HTML bytes in, typed entries out. It performs
//! no I/O and applies no filtering policy — that belongs to the crawler and
//! its [`crate::config::Config`].

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

/// One row of a parsed autoindex listing: either a file or a subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry {
    /// A file, with its absolute URL, display name, and size if reported.
    File {
        /// Absolute URL resolved against the listing's base URL.
        url: String,
        /// Filename as it appeared in the anchor text or `href` tail.
        name: String,
        /// Size in bytes, or `None` if the size cell was absent/unparseable.
        size: Option<u64>,
    },
    /// A subdirectory, with its absolute URL.
    Subdir {
        /// Absolute URL resolved against the listing's base URL.
        url: String,
    },
}

/// Errors raised while parsing an autoindex page.
#[derive(Debug, Error)]
pub enum ListingParseError {
    /// The supplied base URL could not be parsed.
    #[error("invalid base URL {base_url}: {source}")]
    InvalidBaseUrl {
        /// The offending base URL.
        base_url: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
}

static SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)^\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*([KMGT]?B?)\s*$").unwrap()
});

/// Parses a size string: strips commas, matches
/// `/^(\d+(\.\d+)?)\s*([KMGT]?B?)$/i`, and maps units as powers of 1024.
/// Returns `None` on anything that doesn't match, including the bare `"-"`
/// Apache/nginx use for "no size" (directories, unknown).
#[must_use]
pub fn parse_size(text: &str) -> Option<u64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }
    let without_commas = trimmed.replace(',', "");
    let captures = SIZE_PATTERN.captures(&without_commas)?;
    let number: f64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2).map_or("", |m| m.as_str()).to_uppercase();

    let multiplier: f64 = match unit.as_str() {
        "" | "B" => 1.0,
        "K" | "KB" => 1024.0,
        "M" | "MB" => 1024.0_f64.powi(2),
        "G" | "GB" => 1024.0_f64.powi(3),
        "T" | "TB" => 1024.0_f64.powi(4),
        _ => return None,
    };

    Some((number * multiplier).round() as u64)
}

/// Parses an Apache/nginx-style autoindex HTML table at `base_url` into its
/// constituent files and subdirectories.
///
/// # Errors
///
/// Returns [`ListingParseError::InvalidBaseUrl`] if `base_url` itself does
/// not parse. Malformed rows within otherwise-valid HTML are skipped, not
/// errored — a listing parse error is logged and the crawl continues with
/// the next directory, never the whole page failing outright.
pub fn parse(base_url: &str, html_bytes: &[u8]) -> Result<Vec<ListingEntry>, ListingParseError> {
    let base = Url::parse(base_url).map_err(|source| ListingParseError::InvalidBaseUrl {
        base_url: base_url.to_string(),
        source,
    })?;

    let html = String::from_utf8_lossy(html_bytes);
    let document = Html::parse_document(&html);

    #[allow(clippy::unwrap_used)]
    let row_selector = Selector::parse("tr").unwrap();
    #[allow(clippy::unwrap_used)]
    let cell_selector = Selector::parse("td, th").unwrap();
    #[allow(clippy::unwrap_used)]
    let anchor_selector = Selector::parse("a").unwrap();

    let mut entries = Vec::new();

    for row in document.select(&row_selector) {
        let cells: Vec<_> = row.select(&cell_selector).collect();
        if cells.len() < 2 {
            continue;
        }

        let Some(anchor) = cells[0].select(&anchor_selector).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        if href.is_empty() || href.starts_with('?') || href == "../" {
            continue;
        }

        let Ok(absolute) = base.join(href) else {
            trace!(href, "skipping row with unresolvable href");
            continue;
        };

        if href.ends_with('/') {
            entries.push(ListingEntry::Subdir {
                url: absolute.to_string(),
            });
            continue;
        }

        let size = cells[1..]
            .iter()
            .map(|cell| cell.text().collect::<String>())
            .find(|text| !text.trim().is_empty() && text.trim() != "-")
            .and_then(|text| parse_size(&text));

        let name = anchor
            .text()
            .collect::<String>()
            .trim()
            .to_string();
        let name = if name.is_empty() {
            href.rsplit('/').next().unwrap_or(href).to_string()
        } else {
            name
        };

        entries.push(ListingEntry::File {
            url: absolute.to_string(),
            name,
            size,
        });
    }

    debug!(entries = entries.len(), %base_url, "parsed autoindex listing");
    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_size_with_commas_as_plain_bytes() {
        assert_eq!(parse_size("12,345"), Some(12_345));
    }

    #[test]
    fn parses_fractional_gb() {
        assert_eq!(parse_size("1.5 GB"), Some(1_610_612_736));
    }

    #[test]
    fn parses_kilobytes_without_space() {
        assert_eq!(parse_size("1024K"), Some(1_048_576));
    }

    #[test]
    fn dash_means_unknown_size() {
        assert_eq!(parse_size("-"), None);
    }

    #[test]
    fn garbage_means_unknown_size() {
        assert_eq!(parse_size("lots"), None);
    }

    #[test]
    fn crawl_tiny_listing_emits_one_file_and_one_subdir() {
        let html = r#"
            <html><body><table>
            <tr><th>Name</th><th>Size</th></tr>
            <tr><td><a href="../">Parent Directory</a></td><td>-</td></tr>
            <tr><td><a href="Super%20Mario%20World.zip">Super Mario World.zip</a></td><td>512K</td></tr>
            <tr><td><a href="Nintendo%20-%20Game%20Boy/">Nintendo - Game Boy/</a></td><td>-</td></tr>
            </table></body></html>
        "#;

        let entries = parse("https://example.test/files/No-Intro/", html.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);

        let file = entries
            .iter()
            .find_map(|entry| match entry {
                ListingEntry::File { name, size, .. } => Some((name, size)),
                ListingEntry::Subdir { .. } => None,
            })
            .unwrap();
        assert_eq!(file.0, "Super Mario World.zip");
        assert_eq!(*file.1, Some(524_288));

        let subdir = entries.iter().any(|entry| matches!(entry, ListingEntry::Subdir { url } if url.ends_with("Game%20Boy/")));
        assert!(subdir, "expected one recursed subdirectory URL");
    }

    #[test]
    fn skips_query_and_empty_hrefs() {
        let html = r#"
            <table>
            <tr><td><a href="?C=N;O=D">Name</a></td><td>-</td></tr>
            <tr><td><a href="">empty</a></td><td>-</td></tr>
            <tr><td><a href="real.zip">real.zip</a></td><td>1K</td></tr>
            </table>
        "#;
        let entries = parse("https://example.test/", html.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn invalid_base_url_is_an_error() {
        let result = parse("not a url", b"<table></table>");
        assert!(result.is_err());
    }
}
