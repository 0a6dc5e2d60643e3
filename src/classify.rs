//! Classifier: derives console/region/collection/file-format from a file's
//! URL path and name. Every function here is a pure derivation — no I/O, no
//! policy.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::catalog::{Collection, FileFormat};

/// (path-segment needle, display console name) pairs, checked in order
/// against a lowercased `parent_path`. Longer/more specific needles are
/// listed before their broader siblings so e.g. "super nintendo" matches
/// before a bare "nintendo" fallback would apply.
const CONSOLE_TABLE: &[(&str, &str)] = &[
    ("nintendo - game boy advance", "Game Boy Advance"),
    ("nintendo - game boy color", "Game Boy Color"),
    ("nintendo - game boy", "Game Boy"),
    ("nintendo - super nintendo entertainment system", "SNES"),
    ("nintendo - nintendo entertainment system", "NES"),
    ("nintendo - nintendo 64", "Nintendo 64"),
    ("nintendo - nintendo gamecube", "GameCube"),
    ("nintendo - wii u", "Wii U"),
    ("nintendo - wii", "Wii"),
    ("nintendo - nintendo ds", "Nintendo DS"),
    ("nintendo - nintendo 3ds", "Nintendo 3DS"),
    ("sony - playstation portable", "PlayStation Portable"),
    ("sony - playstation vita", "PlayStation Vita"),
    ("sony - playstation 2", "PlayStation 2"),
    ("sony - playstation 3", "PlayStation 3"),
    ("sony - playstation", "PlayStation"),
    ("sega - mega drive", "Sega Genesis"),
    ("sega - genesis", "Sega Genesis"),
    ("sega - dreamcast", "Sega Dreamcast"),
    ("sega - saturn", "Sega Saturn"),
    ("sega - game gear", "Sega Game Gear"),
    ("microsoft - xbox 360", "Xbox 360"),
    ("microsoft - xbox", "Xbox"),
    ("atari - 2600", "Atari 2600"),
    ("atari - 7800", "Atari 7800"),
    ("atari - lynx", "Atari Lynx"),
];

/// Vendor tokens consulted by the fallback path-segment scan when no
/// `CONSOLE_TABLE` entry matches.
const VENDOR_TOKENS: &[&str] = &["nintendo", "sony", "sega", "microsoft", "atari"];

static REGION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(
        r"(?i)[\(\[]([^\)\]]*\b(USA|Europe|Japan|World|En|Fr|De|Es|It|Pt|Nl|Sv|No|Da|Fi|Ru|Ko|Zh|Rev\s?\d+)\b[^\)\]]*)[\)\]]",
    )
    .unwrap()
});

/// Derives the host-relative logical path: `absolute_url`'s path with
/// `base_url`'s path stripped, trimmed of leading/trailing slashes.
#[must_use]
pub fn parent_path(absolute_url: &Url, base_url: &Url) -> String {
    let full = absolute_url.path();
    let base = base_url.path();
    let stripped = full.strip_prefix(base).unwrap_or(full);
    // The tail after stripping the base still includes the filename itself;
    // drop the last segment to get the *directory* path.
    let dir = stripped.rsplit_once('/').map_or("", |(dir, _)| dir);
    dir.trim_matches('/').to_string()
}

/// Derives the console/platform name from a lowercased `parent_path`.
///
/// Matches `CONSOLE_TABLE` first; on no match, falls back to the first path
/// segment containing a known vendor token; `None` if nothing matches.
#[must_use]
pub fn console(parent_path: &str) -> Option<String> {
    let lower = parent_path.to_lowercase();

    if let Some((_, name)) = CONSOLE_TABLE.iter().find(|(needle, _)| lower.contains(needle)) {
        return Some((*name).to_string());
    }

    lower
        .split('/')
        .find(|segment| VENDOR_TOKENS.iter().any(|token| segment.contains(token)))
        .map(ToString::to_string)
}

/// Extracts the first parenthesized/bracketed region tag in `filename`, if
/// present.
#[must_use]
pub fn region(filename: &str) -> Option<String> {
    REGION_PATTERN
        .captures(filename)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Infers the collection from the first path segment matching a known
/// collection name; defaults to `Collection::Unknown`.
#[must_use]
pub fn collection(parent_path: &str) -> Collection {
    let lower = parent_path.to_lowercase();
    lower
        .split('/')
        .find_map(Collection::match_segment)
        .unwrap_or(Collection::Unknown)
}

/// Maps a lowercased filename extension to a [`FileFormat`].
#[must_use]
pub fn file_format(filename: &str) -> FileFormat {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    FileFormat::from_extension(&ext)
}
