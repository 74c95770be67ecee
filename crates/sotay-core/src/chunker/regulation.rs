//! Regulation-specific chunking rules.
//!
//! Vietnamese regulation documents follow a fixed hierarchy:
//! `CHƯƠNG` (chapter) → `Điều` (article) → `Khoản` (numbered clause) →
//! `Mục` (lettered clause). `CHƯƠNG` and `Điều` are recognized even as plain
//! text; `Khoản` (`1.`) and `Mục` (`a)`) collide with list markup and must
//! carry explicit markdown headers to be detected.

use super::{RawChunk, SplitterStats, TITLE_HEADER};
use once_cell::sync::Lazy;
use regex::Regex;

/// `Điều 10.` or `**Điều 10.**` at line start.
static DIEU_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*{0,2}Điều\s+\d+\.").unwrap_or_else(|_| unreachable!()));

/// `CHƯƠNG 1`, `CHƯƠNG I` at line start.
static CHUONG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CHƯƠNG\s+[IVXLCDM0-9]+").unwrap_or_else(|_| unreachable!()));

/// `# Chương 1` with malformed spacing.
static CHUONG_HEADER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^##?\s*Chương\s+\d+").unwrap_or_else(|_| unreachable!()));

static DIEU_TRUNCATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Điều\s+\d+)").unwrap_or_else(|_| unreachable!()));

static CHUONG_TRUNCATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(CHƯƠNG\s+[IVXLCDM0-9]+)").unwrap_or_else(|_| unreachable!()));

static KHOAN_TRUNCATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.").unwrap_or_else(|_| unreachable!()));

static MUC_TRUNCATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z])[).]").unwrap_or_else(|_| unreachable!()));

/// Sections that end the leading-title run and are kept as their own chunks.
const SPECIAL_SECTIONS: [&str; 3] = ["MỤC LỤC", "DANH MỤC TỪ VIẾT TẮT", "QUYẾT ĐỊNH"];

/// Maximum content length (chars) for a chunk to count as part of the title.
const TITLE_MAX_CONTENT_CHARS: usize = 150;

/// Maximum content lines for a chunk to count as part of the title.
const TITLE_MAX_CONTENT_LINES: usize = 3;

/// How many leading chunks are examined for title merging.
const TITLE_SCAN_WINDOW: usize = 5;

/// Check if a plain-text line is an implicit section marker.
pub(super) fn is_section_marker(line: &str) -> bool {
    let trimmed = line.trim();
    CHUONG_PATTERN.is_match(trimmed)
        || CHUONG_HEADER_PATTERN.is_match(trimmed)
        || DIEU_PATTERN.is_match(trimmed)
}

/// Truncate a regulation header for hierarchy display.
///
/// Known patterns truncate regardless of length; anything else only past
/// `max_length` chars.
pub(super) fn truncate_header(header: &str, max_length: usize) -> String {
    let header = header.trim_matches('*').trim();

    if let Some(caps) = DIEU_TRUNCATE.captures(header) {
        return caps[1].to_string();
    }
    if let Some(caps) = CHUONG_TRUNCATE.captures(header) {
        return caps[1].to_string();
    }
    if let Some(caps) = KHOAN_TRUNCATE.captures(header) {
        return format!("Khoản {}", &caps[1]);
    }
    if let Some(caps) = MUC_TRUNCATE.captures(header) {
        return format!("Mục {}", &caps[1]);
    }

    if header.chars().count() <= max_length {
        return header.to_string();
    }
    let truncated: String = header.chars().take(max_length).collect();
    format!("{truncated}...")
}

/// Merge a run of short leading chunks into a single title chunk.
///
/// Parsers split the formal title of a decision across several headers; when
/// the first K (≥ 2, within the first five) chunks are short and none is a
/// special section, they become one `TITLE` chunk.
pub(super) fn merge_title_chunks(
    chunks: Vec<RawChunk>,
    stats: &mut SplitterStats,
) -> Vec<RawChunk> {
    if chunks.len() < 2 {
        return chunks;
    }

    let mut title_count = 0;
    for chunk in chunks.iter().take(TITLE_SCAN_WINDOW) {
        if let Some(header) = &chunk.current_header {
            let upper = header.to_uppercase();
            if SPECIAL_SECTIONS.iter().any(|s| upper.contains(s)) {
                break;
            }
        }

        let content_lines: Vec<&str> = chunk
            .text
            .lines()
            .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
            .collect();
        let content_chars: usize = content_lines.iter().map(|l| l.chars().count()).sum();

        if content_chars < TITLE_MAX_CONTENT_CHARS && content_lines.len() < TITLE_MAX_CONTENT_LINES
        {
            title_count += 1;
        } else {
            break;
        }
    }

    if title_count < 2 {
        return chunks;
    }

    stats.title_chunks_merged = title_count;

    let mut iter = chunks.into_iter();
    let title_parts: Vec<RawChunk> = iter.by_ref().take(title_count).collect();

    let merged_text = title_parts
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let merged_header = title_parts
        .iter()
        .filter_map(|c| c.current_header.as_deref())
        .collect::<Vec<_>>()
        .join(" ");

    let merged = RawChunk {
        text: merged_text,
        header_path: Vec::new(),
        current_header: Some(if merged_header.is_empty() {
            TITLE_HEADER.to_string()
        } else {
            merged_header
        }),
        level: 0,
        start_char_idx: title_parts.first().and_then(|c| c.start_char_idx),
        end_char_idx: title_parts.last().and_then(|c| c.end_char_idx),
    };

    let mut result = vec![merged];
    result.extend(iter);
    result
}
