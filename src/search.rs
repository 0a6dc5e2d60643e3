//! Catalog search engine: fuzzy + substring + field-tagged query over the
//! [`FileRecord`] catalog. Reads only from the catalog — it never touches
//! the network or the filesystem.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::instrument;

use crate::catalog::{CatalogError, CatalogStore, Collection, FileRecord, ListFilter};

/// Default acceptance threshold for fuzzy/substring matches.
pub const DEFAULT_MIN_SCORE: u8 = 60;

/// Which of the five merge strategies produced a [`SearchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Normalized query equals normalized name exactly.
    Exact,
    /// Levenshtein-based similarity ratio against the name.
    Fuzzy,
    /// Query is a normalized substring of the name.
    PartialSubstring,
    /// Query matched the console directly or via the alias table.
    Console,
    /// Query contained a region keyword matched against the record's region.
    Region,
    /// Query contained a collection keyword matched against the record's
    /// collection.
    Collection,
}

/// One scored hit from [`search`].
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched record.
    pub record: FileRecord,
    /// Confidence score in `0..=100`.
    pub score: u8,
    /// Which strategy produced this hit.
    pub match_type: MatchType,
    /// Which field the match was against (`"name"`, `"console"`, etc.).
    pub matched_field: &'static str,
}

/// Console aliases consulted by the console-match strategy (e.g. snes ↔
/// Super Nintendo/Super Famicom/SFC), grouped so that any member in a group
/// is considered equivalent to every other member.
const CONSOLE_ALIASES: &[&[&str]] = &[
    &["snes", "super nintendo", "super nintendo entertainment system", "super famicom", "sfc"],
    &["nes", "nintendo entertainment system", "famicom"],
    &["genesis", "sega genesis", "mega drive", "megadrive"],
    &["gba", "game boy advance"],
    &["gbc", "game boy color"],
    &["gb", "game boy"],
    &["n64", "nintendo 64"],
    &["psx", "ps1", "playstation", "playstation 1"],
    &["ps2", "playstation 2"],
    &["ps3", "playstation 3"],
    &["psp", "playstation portable"],
];

/// Region keywords the region-match strategy looks for in the query.
const REGION_KEYWORDS: &[&str] = &["usa", "europe", "japan", "world"];

/// Collection keywords the collection-match strategy looks for in the query.
const COLLECTION_KEYWORDS: &[&str] =
    &["no-intro", "redump", "mame", "tosec", "finalburn neo", "fbneo"];

/// Title aliases folded in by [`normalize`].
const TITLE_ALIASES: &[(&str, &str)] = &[("pokémon", "pokemon"), ("biohazard", "resident evil")];

/// Lowercases `text`, replaces punctuation with spaces, collapses
/// whitespace, and folds a small table of common title aliases.
#[must_use]
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let punctuation_replaced: String = lowered
        .chars()
        .map(|c| if "_-.()[]!".contains(c) { ' ' } else { c })
        .collect();
    punctuation_replaced
        .split_whitespace()
        .map(|word| {
            TITLE_ALIASES
                .iter()
                .find(|(from, _)| *from == word)
                .map_or(word, |(_, to)| *to)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn console_alias_group(value: &str) -> Option<&'static [&'static str]> {
    CONSOLE_ALIASES.iter().find(|group| group.contains(&value)).copied()
}

fn fuzzy_score(query: &str, candidate: &str) -> u8 {
    let ratio = strsim::normalized_levenshtein(query, candidate);
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

fn partial_substring_score(query: &str, name: &str) -> Option<u8> {
    if query.is_empty() || !name.contains(query) {
        return None;
    }
    let ratio = (query.len() as f64 / name.len() as f64) * 100.0;
    Some(ratio.floor().min(95.0) as u8)
}

/// Searches the catalog for `query`, optionally restricted to `console`
/// and/or `collection`, returning at most `limit` hits at or above
/// `min_score`, highest-scored first, deduplicated by URL.
///
/// # Errors
///
/// Returns [`CatalogError`] if the underlying catalog read fails.
#[instrument(skip(catalog), fields(%query, limit))]
pub async fn search(
    catalog: &Arc<dyn CatalogStore>,
    query: &str,
    console: Option<&str>,
    collection: Option<Collection>,
    limit: usize,
    min_score: u8,
) -> Result<Vec<SearchResult>, CatalogError> {
    let filter = ListFilter { console: console.map(str::to_string), collection, ..ListFilter::default() };
    let candidates = catalog.list(&filter).await?;

    let normalized_query = normalize(query);
    let mut best: HashMap<String, SearchResult> = HashMap::new();

    for record in &candidates {
        let normalized_name = normalize(&record.name);

        if normalized_query == normalized_name {
            upsert_best(&mut best, record, 100, MatchType::Exact, "name");
            continue;
        }

        let fuzzy = fuzzy_score(&normalized_query, &normalized_name);
        if fuzzy >= min_score {
            upsert_best(&mut best, record, fuzzy, MatchType::Fuzzy, "name");
        }

        if let Some(score) = partial_substring_score(&normalized_query, &normalized_name) {
            if score >= min_score {
                upsert_best(&mut best, record, score, MatchType::PartialSubstring, "name");
            }
        }

        if let Some(record_console) = &record.console {
            let normalized_console = normalize(record_console);
            if normalized_query == normalized_console {
                upsert_best(&mut best, record, 90, MatchType::Console, "console");
            } else if let Some(group) = console_alias_group(&normalized_query) {
                if group.contains(&normalized_console.as_str()) {
                    upsert_best(&mut best, record, 85, MatchType::Console, "console");
                }
            }
        }

        if let Some(record_region) = &record.region {
            let normalized_region = normalize(record_region);
            let query_has_region_keyword =
                REGION_KEYWORDS.iter().any(|keyword| normalized_query.contains(keyword));
            if query_has_region_keyword && normalized_region.contains(&normalized_query) {
                upsert_best(&mut best, record, 75, MatchType::Region, "region");
            }
        }

        let normalized_collection = normalize(record.collection.as_str());
        let query_has_collection_keyword =
            COLLECTION_KEYWORDS.iter().any(|keyword| normalized_query.contains(keyword));
        if query_has_collection_keyword && normalized_query == normalized_collection {
            upsert_best(&mut best, record, 70, MatchType::Collection, "collection");
        }
    }

    let mut results: Vec<SearchResult> = best.into_values().collect();
    results.sort_by(|a, b| b.score.cmp(&a.score));
    results.truncate(limit);
    Ok(results)
}

fn upsert_best(
    best: &mut HashMap<String, SearchResult>,
    record: &FileRecord,
    score: u8,
    match_type: MatchType,
    matched_field: &'static str,
) {
    let entry = best.entry(record.url.clone());
    entry
        .and_modify(|existing| {
            if score > existing.score {
                existing.score = score;
                existing.match_type = match_type;
                existing.matched_field = matched_field;
            }
        })
        .or_insert_with(|| SearchResult { record: record.clone(), score, match_type, matched_field });
}

/// Returns distinct names/consoles whose normalized form starts with
/// `normalize(prefix)`, each trimmed at its first parenthesis/bracket/dash.
///
/// # Errors
///
/// Returns [`CatalogError`] if the underlying catalog read fails.
pub async fn suggest(
    catalog: &Arc<dyn CatalogStore>,
    prefix: &str,
    limit: usize,
) -> Result<Vec<String>, CatalogError> {
    let normalized_prefix = normalize(prefix);
    let records = catalog.list(&ListFilter::default()).await?;

    let mut seen = std::collections::HashSet::new();
    let mut suggestions = Vec::new();

    let mut candidates: Vec<String> = records.iter().map(|record| record.name.clone()).collect();
    for record in &records {
        if let Some(console) = &record.console {
            candidates.push(console.clone());
        }
    }

    for candidate in candidates {
        let normalized = normalize(&candidate);
        if !normalized.starts_with(&normalized_prefix) {
            continue;
        }
        let trimmed = trim_at_first_bracket(&candidate);
        if seen.insert(trimmed.clone()) {
            suggestions.push(trimmed);
        }
        if suggestions.len() >= limit {
            break;
        }
    }

    Ok(suggestions)
}

fn trim_at_first_bracket(title: &str) -> String {
    let cut = ['(', '[', '-']
        .iter()
        .filter_map(|marker| title.find(*marker))
        .min()
        .unwrap_or(title.len());
    title[..cut].trim().to_string()
}
