//! Fix-markdown stage: LLM structural repair.

use crate::Result;
use crate::fixer::MarkdownFixer;
use crate::pipeline::stage::Stage;
use crate::state::PipelineState;
use crate::storage::Storage;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;

/// Repairs header hierarchy via the LLM fixer, producing `05-fixed.md`.
/// Costly (one model call per document). Strictly structural: content words
/// are preserved.
pub struct FixMarkdownStage {
    fixer: Arc<MarkdownFixer>,
}

impl FixMarkdownStage {
    /// Create the stage over a shared fixer.
    #[must_use]
    pub fn new(fixer: Arc<MarkdownFixer>) -> Self {
        Self { fixer }
    }
}

#[async_trait]
impl Stage for FixMarkdownStage {
    fn name(&self) -> &'static str {
        "fix-markdown"
    }

    fn is_costly(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Repair markdown header hierarchy"
    }

    fn output_filename(&self) -> Option<&'static str> {
        Some("05-fixed.md")
    }

    async fn execute(
        &self,
        input_path: &Path,
        output_path: Option<&Path>,
        state: &mut PipelineState,
        _storage: &Storage,
    ) -> Result<Map<String, Value>> {
        let content = std::fs::read_to_string(input_path)?;
        let fixed = self.fixer.fix(&content, state.category).await?;

        if let Some(path) = output_path {
            crate::storage::write_atomic(path, &fixed)?;
        }

        let mut metadata = Map::new();
        metadata.insert("input_chars".to_string(), json!(content.chars().count()));
        metadata.insert("output_chars".to_string(), json!(fixed.chars().count()));
        Ok(metadata)
    }
}
