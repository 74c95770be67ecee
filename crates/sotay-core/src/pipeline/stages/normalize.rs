//! Normalize stage: minor textual normalization.

use crate::Result;
use crate::pipeline::stage::Stage;
use crate::state::PipelineState;
use crate::storage::Storage;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Normalize whitespace, bullet characters, and unicode form.
///
/// - NFC composition (Vietnamese text mixes NFC and NFD in the wild)
/// - en-dash / figure-dash / bullet list markers become `-`
/// - trailing whitespace per line dropped
/// - runs of blank lines collapsed to one
#[must_use]
pub fn normalize_text(content: &str) -> String {
    let composed: String = content.nfc().collect();

    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0usize;

    for line in composed.lines() {
        let mut line = line.trim_end().to_string();

        for bullet in ["‒ ", "– ", "— ", "• ", "∙ "] {
            if let Some(rest) = line.trim_start().strip_prefix(bullet) {
                let indent_len = line.len() - line.trim_start().len();
                let indent = line[..indent_len].to_string();
                line = format!("{indent}- {rest}");
                break;
            }
        }

        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line);
    }

    let mut result = lines.join("\n");
    if content.ends_with('\n') && !result.ends_with('\n') {
        result.push('\n');
    }
    result
}

/// Produces `03-normalized.md`. Non-costly.
pub struct NormalizeStage;

#[async_trait]
impl Stage for NormalizeStage {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn description(&self) -> &'static str {
        "Normalize whitespace, bullets, and unicode"
    }

    fn output_filename(&self) -> Option<&'static str> {
        Some("03-normalized.md")
    }

    async fn execute(
        &self,
        input_path: &Path,
        output_path: Option<&Path>,
        _state: &mut PipelineState,
        _storage: &Storage,
    ) -> Result<Map<String, Value>> {
        let content = std::fs::read_to_string(input_path)?;
        let normalized = normalize_text(&content);

        if let Some(path) = output_path {
            crate::storage::write_atomic(path, &normalized)?;
        }

        let mut metadata = Map::new();
        metadata.insert("chars".to_string(), json!(normalized.chars().count()));
        Ok(metadata)
    }
}
