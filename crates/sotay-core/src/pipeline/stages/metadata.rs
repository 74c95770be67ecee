//! Metadata stage: typed metadata extraction to `metadata.json`.

use crate::Result;
use crate::metadata::MetadataGenerator;
use crate::pipeline::stage::Stage;
use crate::state::PipelineState;
use crate::storage::Storage;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;

/// Extracts category-specific structured metadata from the fixed markdown.
/// Costly (one model call per document).
pub struct MetadataStage {
    generator: Arc<dyn MetadataGenerator>,
}

impl MetadataStage {
    /// Create the stage over a category-specific generator.
    #[must_use]
    pub fn new(generator: Arc<dyn MetadataGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Stage for MetadataStage {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn is_costly(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Extract structured document metadata"
    }

    fn output_filename(&self) -> Option<&'static str> {
        Some("metadata.json")
    }

    async fn execute(
        &self,
        input_path: &Path,
        output_path: Option<&Path>,
        state: &mut PipelineState,
        _storage: &Storage,
    ) -> Result<Map<String, Value>> {
        let content = std::fs::read_to_string(input_path)?;

        // The source filename carries the authoritative code and date.
        let filename = state
            .source_file
            .as_deref()
            .map_or_else(|| format!("{}.md", state.document_id), String::from);

        let metadata_value = self.generator.generate(&filename, &content).await?;

        if let Some(path) = output_path {
            let json = serde_json::to_string_pretty(&metadata_value)?;
            crate::storage::write_atomic(path, &json)?;
        }

        let mut meta = Map::new();
        meta.insert(
            "fields".to_string(),
            json!(
                metadata_value
                    .as_object()
                    .map(serde_json::Map::len)
                    .unwrap_or(0)
            ),
        );
        if let Some(title) = metadata_value.get("title") {
            meta.insert("title".to_string(), title.clone());
        }
        Ok(meta)
    }
}
