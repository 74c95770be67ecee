//! Program-disambiguation filter.
//!
//! Similar majors retrieve each other's chunks ("Khoa học Máy tính" vs
//! "Kỹ thuật Máy tính"), so after reranking, a detected program mention
//! hard-filters results by `document_id` slug. University-name strings are
//! stripped first — "Trường Đại học Công nghệ Thông tin" names the school,
//! not the Công nghệ Thông tin major.

use crate::types::ScoredNode;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

/// University-name strings that must never count as a program mention.
/// Ordered longest first so the longest form strips first.
const UNIVERSITY_NAMES: [&str; 4] = [
    "trường đại học công nghệ thông tin",
    "đại học công nghệ thông tin",
    "đhcntt",
    "uit",
];

/// Known program aliases: `(alias, canonical slug)`.
///
/// Full Vietnamese names plus code abbreviations. Lookup scans the query for
/// every alias; the earliest-position match wins, longest alias on ties.
const PROGRAM_ALIASES: [(&str, &str); 22] = [
    ("khoa học máy tính", "khoa-hoc-may-tinh"),
    ("khmt", "khoa-hoc-may-tinh"),
    ("kỹ thuật máy tính", "ky-thuat-may-tinh"),
    ("ktmt", "ky-thuat-may-tinh"),
    ("công nghệ thông tin", "cong-nghe-thong-tin"),
    ("cntt", "cong-nghe-thong-tin"),
    ("kỹ thuật phần mềm", "ky-thuat-phan-mem"),
    ("ktpm", "ky-thuat-phan-mem"),
    ("hệ thống thông tin", "he-thong-thong-tin"),
    ("httt", "he-thong-thong-tin"),
    ("an toàn thông tin", "an-toan-thong-tin"),
    ("attt", "an-toan-thong-tin"),
    ("khoa học dữ liệu", "khoa-hoc-du-lieu"),
    ("khdl", "khoa-hoc-du-lieu"),
    ("trí tuệ nhân tạo", "tri-tue-nhan-tao"),
    ("ttnt", "tri-tue-nhan-tao"),
    ("mạng máy tính và truyền thông dữ liệu", "mang-may-tinh"),
    ("mạng máy tính", "mang-may-tinh"),
    ("mmt&tt", "mang-may-tinh"),
    ("thương mại điện tử", "thuong-mai-dien-tu"),
    ("tmđt", "thuong-mai-dien-tu"),
    ("tmdt", "thuong-mai-dien-tu"),
];

/// Detect a program mention in a query and return its canonical slug.
#[must_use]
pub fn detect_program(query: &str) -> Option<String> {
    let mut normalized: String = query.nfc().collect::<String>().to_lowercase();

    // The school's own name is not a program mention.
    for name in UNIVERSITY_NAMES {
        while let Some(pos) = normalized.find(name) {
            normalized.replace_range(pos..pos + name.len(), &" ".repeat(name.len()));
        }
    }

    // Earliest position wins; longest alias breaks ties.
    let mut best: Option<(usize, usize, &str)> = None;
    for (alias, slug) in PROGRAM_ALIASES {
        if let Some(pos) = normalized.find(alias) {
            let candidate = (pos, alias.len(), slug);
            best = match best {
                None => Some(candidate),
                Some((best_pos, best_len, _))
                    if pos < best_pos || (pos == best_pos && alias.len() > best_len) =>
                {
                    Some(candidate)
                },
                other => other,
            };
        }
    }

    best.map(|(_, _, slug)| slug.to_string())
}

/// Drop nodes whose `document_id` does not contain the mentioned program.
///
/// No mention means no filtering. An emptied result list falls back to the
/// unfiltered input — cross-program context beats no context.
#[must_use]
pub fn apply_program_filter(query: &str, nodes: Vec<ScoredNode>) -> Vec<ScoredNode> {
    let Some(slug) = detect_program(query) else {
        return nodes;
    };

    debug!("Program filter active: {slug}");
    let filtered: Vec<ScoredNode> = nodes
        .iter()
        .filter(|n| n.document_id.contains(&slug))
        .cloned()
        .collect();

    if filtered.is_empty() {
        warn!("Program filter for '{slug}' removed every result, keeping unfiltered list");
        return nodes;
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;

    fn node(document_id: &str, score: f32) -> ScoredNode {
        ScoredNode {
            id: format!("{document_id}-0"),
            document_id: document_id.to_string(),
            text: String::new(),
            metadata: ChunkMetadata::new(),
            score,
        }
    }

    #[test]
    fn test_detects_full_name_and_abbreviation() {
        assert_eq!(
            detect_program("môn học của ngành Khoa học máy tính khóa 2022"),
            Some("khoa-hoc-may-tinh".to_string())
        );
        assert_eq!(
            detect_program("CTĐT ngành KTPM năm 2024"),
            Some("ky-thuat-phan-mem".to_string())
        );
    }

    #[test]
    fn test_university_name_is_not_a_program() {
        assert_eq!(
            detect_program("điều kiện tốt nghiệp của Trường Đại học Công nghệ Thông tin"),
            None
        );
        assert_eq!(detect_program("UIT có bao nhiêu tín chỉ?"), None);
    }

    #[test]
    fn test_nganh_cntt_still_detected_next_to_university_name() {
        assert_eq!(
            detect_program("ngành Công nghệ thông tin của Trường Đại học Công nghệ Thông tin"),
            Some("cong-nghe-thong-tin".to_string())
        );
    }

    #[test]
    fn test_earliest_match_wins() {
        assert_eq!(
            detect_program("so sánh Khoa học máy tính và Kỹ thuật máy tính"),
            Some("khoa-hoc-may-tinh".to_string())
        );
        assert_eq!(
            detect_program("so sánh Kỹ thuật máy tính và Khoa học máy tính"),
            Some("ky-thuat-may-tinh".to_string())
        );
    }

    #[test]
    fn test_longest_match_breaks_position_ties() {
        // "mạng máy tính và truyền thông dữ liệu" and its prefix start at the
        // same position; the longer alias must win.
        assert_eq!(
            detect_program("ngành mạng máy tính và truyền thông dữ liệu"),
            Some("mang-may-tinh".to_string())
        );
    }

    #[test]
    fn test_filter_keeps_matching_documents() {
        let nodes = vec![
            node("cu-nhan-nganh-khoa-hoc-may-tinh-2022", 0.9),
            node("cu-nhan-nganh-ky-thuat-may-tinh-2022", 0.8),
        ];
        let filtered =
            apply_program_filter("môn học của ngành Khoa học máy tính khóa 2022", nodes);
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].document_id.contains("khoa-hoc-may-tinh"));
    }

    #[test]
    fn test_filter_fallback_when_emptied() {
        let nodes = vec![node("cu-nhan-nganh-ky-thuat-may-tinh-2022", 0.8)];
        let filtered = apply_program_filter("ngành Khoa học máy tính", nodes.clone());
        assert_eq!(filtered.len(), nodes.len());
    }

    #[test]
    fn test_no_mention_no_filter() {
        let nodes = vec![node("quy-che-dao-tao", 0.9)];
        let filtered = apply_program_filter("điều kiện tốt nghiệp", nodes.clone());
        assert_eq!(filtered.len(), nodes.len());
    }
}
