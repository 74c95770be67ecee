//! Clean stage: strip letterheads and navigational boilerplate.

use crate::pipeline::stage::Stage;
use crate::state::PipelineState;
use crate::storage::Storage;
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::Path;

/// Formal letterhead markers of Vietnamese official documents.
const LETTERHEAD_MARKERS: [&str; 7] = [
    "ĐẠI HỌC QUỐC GIA",
    "TRƯỜNG ĐẠI HỌC",
    "CỘNG HÒA XÃ HỘI CHỦ NGHĨA",
    "CỘNG HOÀ XÃ HỘI CHỦ NGHĨA",
    "Độc lập - Tự do - Hạnh phúc",
    "Độc lập – Tự do – Hạnh phúc",
    "Số:",
];

/// Markers that start the document body; cleaning stops here.
const CONTENT_MARKERS: [&str; 5] = ["QUYẾT ĐỊNH", "THÔNG BÁO", "QUY ĐỊNH", "QUY CHẾ", "HƯỚNG DẪN"];

/// Strip the letterhead block from the top of a document.
///
/// When a letterhead is detected, everything before the first content marker
/// goes; when no letterhead is present (or no content marker follows one),
/// the original text comes back unchanged.
#[must_use]
pub fn strip_letterhead(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();

    // Only the head of the document can be a letterhead.
    let scan_window = lines.len().min(40);
    let letterhead_found = lines[..scan_window].iter().any(|line| {
        let line = line.trim().trim_start_matches('#').trim_start_matches('*').trim();
        LETTERHEAD_MARKERS.iter().any(|m| line.starts_with(m))
    });

    if !letterhead_found {
        return content.to_string();
    }

    let body_start = lines[..scan_window].iter().position(|line| {
        let line = line.trim().trim_start_matches('#').trim();
        CONTENT_MARKERS
            .iter()
            .any(|m| line.starts_with(m) || line.trim_start_matches('*').starts_with(m))
    });

    match body_start {
        Some(idx) => lines[idx..].join("\n"),
        None => content.to_string(),
    }
}

/// Removes navigational boilerplate and letterheads, producing
/// `02-cleaned.md`. Non-costly.
pub struct CleanStage;

#[async_trait]
impl Stage for CleanStage {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn description(&self) -> &'static str {
        "Remove letterheads and boilerplate"
    }

    fn output_filename(&self) -> Option<&'static str> {
        Some("02-cleaned.md")
    }

    async fn execute(
        &self,
        input_path: &Path,
        output_path: Option<&Path>,
        _state: &mut PipelineState,
        _storage: &Storage,
    ) -> Result<Map<String, Value>> {
        let content = std::fs::read_to_string(input_path)?;
        let cleaned = strip_letterhead(&content);
        let removed = content.len().saturating_sub(cleaned.len());

        if let Some(path) = output_path {
            crate::storage::write_atomic(path, &cleaned)?;
        }

        let mut metadata = Map::new();
        metadata.insert("chars_removed".to_string(), json!(removed));
        Ok(metadata)
    }
}
