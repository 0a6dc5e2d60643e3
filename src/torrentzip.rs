//! Advisory TorrentZip marker inspection.
//!
//! This looks only at a ZIP's trailing archive comment for a
//! `TORRENTZIPPED-XXXXXXXX` marker. The CRC-32 captured here is **advisory
//! metadata only** — it is never computed from or checked against the
//! archive's actual central directory, and never participates in
//! checksum-mismatch disposition.

const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const EOCD_MIN_LEN: usize = 22;
const MAX_COMMENT_SCAN: usize = 66_000; // 64 KiB max comment length + EOCD record

const MARKER_PREFIX: &str = "TORRENTZIPPED-";

/// Result of inspecting a ZIP's trailing comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentZipMarker {
    /// The 8 hex digits captured verbatim from the comment.
    pub crc32_hex: String,
}

/// Scans the tail of a ZIP file's bytes for a well-formed
/// `TORRENTZIPPED-XXXXXXXX` marker in the end-of-central-directory comment.
///
/// Returns `None` if no End Of Central Directory record is found, or if the
/// comment does not carry a well-formed marker. Never panics on truncated
/// or malformed input — this is a best-effort, advisory-only inspection.
#[must_use]
pub fn inspect_trailing_comment(zip_bytes: &[u8]) -> Option<TorrentZipMarker> {
    if zip_bytes.len() < EOCD_MIN_LEN {
        return None;
    }

    let scan_start = zip_bytes.len().saturating_sub(MAX_COMMENT_SCAN);
    let tail = &zip_bytes[scan_start..];

    // Find the *last* EOCD signature in the scanned tail (comments can
    // legally contain the 4-byte signature themselves).
    let eocd_offset = tail
        .windows(4)
        .enumerate()
        .rev()
        .find(|(_, window)| *window == EOCD_SIGNATURE)
        .map(|(index, _)| index)?;

    let record_start = eocd_offset;
    if record_start + EOCD_MIN_LEN > tail.len() {
        return None;
    }

    let comment_len = u16::from_le_bytes([tail[record_start + 20], tail[record_start + 21]]) as usize;
    let comment_start = record_start + EOCD_MIN_LEN;
    let comment_bytes = tail.get(comment_start..comment_start + comment_len)?;
    let comment = String::from_utf8_lossy(comment_bytes);

    let hex = comment.strip_prefix(MARKER_PREFIX)?;
    // `comment` can contain multibyte UTF-8 (it's lossily decoded from
    // attacker-controlled bytes), so take by char, never by byte index.
    let hex: String = hex.chars().take(8).collect();
    if hex.chars().count() == 8 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(TorrentZipMarker { crc32_hex: hex })
    } else {
        None
    }
}
