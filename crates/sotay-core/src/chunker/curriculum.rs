//! Curriculum-specific chunking rules.
//!
//! Curriculum headers are already short and descriptive (`1. GIỚI THIỆU`,
//! `1.1. Mục tiêu đào tạo`), so they are kept verbatim; only headers past the
//! display cap are shortened. Oversized table sections fall through to the
//! sentence sub-chunker, which splits on paragraph then line boundaries and
//! therefore keeps table rows intact.

/// Truncate a curriculum header only when it exceeds `max_length` chars.
pub(super) fn truncate_header(header: &str, max_length: usize) -> String {
    let header = header.trim();
    if header.chars().count() <= max_length {
        return header.to_string();
    }
    let truncated: String = header.chars().take(max_length).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_kept_verbatim() {
        assert_eq!(truncate_header("1. GIỚI THIỆU CHUNG", 80), "1. GIỚI THIỆU CHUNG");
        assert_eq!(
            truncate_header("1.3.1. Nhóm các môn học cơ sở nhóm ngành", 80),
            "1.3.1. Nhóm các môn học cơ sở nhóm ngành"
        );
    }

    #[test]
    fn test_long_headers_capped() {
        let long = "Nhóm ".repeat(30);
        let truncated = truncate_header(&long, 80);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 83);
    }
}
