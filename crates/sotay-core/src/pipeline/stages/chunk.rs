//! Chunk stage: structure-aware split into `chunks.json`.
//!
//! Always runs. The chunks file is cheap to regenerate and doubles as a
//! debugging artifact, so skipping on hash match buys nothing.

use crate::Result;
use crate::chunker::{Chunker, SplitterConfig};
use crate::pipeline::stage::Stage;
use crate::state::PipelineState;
use crate::storage::Storage;
use crate::types::{Category, flatten_metadata};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::Path;
use tracing::warn;

/// Splits the final markdown into chunks with hierarchy context.
pub struct ChunkStage {
    config: SplitterConfig,
}

impl ChunkStage {
    /// Create the stage with chunker settings.
    #[must_use]
    pub const fn new(config: SplitterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Stage for ChunkStage {
    fn name(&self) -> &'static str {
        "chunk"
    }

    fn description(&self) -> &'static str {
        "Parse markdown into chunks"
    }

    fn output_filename(&self) -> Option<&'static str> {
        None
    }

    fn always_runs(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        input_path: &Path,
        _output_path: Option<&Path>,
        state: &mut PipelineState,
        storage: &Storage,
    ) -> Result<Map<String, Value>> {
        let content = std::fs::read_to_string(input_path)?;

        // Document metadata is optional; chunking works without it.
        let mut metadata = Map::new();
        let metadata_path = storage.artifact_path(state.category, &state.document_id, "metadata.json")?;
        if metadata_path.exists() {
            match std::fs::read_to_string(&metadata_path)
                .map_err(crate::Error::from)
                .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(Into::into))
            {
                Ok(Value::Object(map)) => metadata = map,
                Ok(_) => warn!("metadata.json is not an object, ignoring"),
                Err(e) => warn!("Failed to load metadata.json: {e}"),
            }
        }

        // Flatten to vector-store-safe scalars and stamp identity fields.
        let mut flat = flatten_metadata(&metadata);
        flat.insert("category".to_string(), json!(state.category.as_str()));
        flat.insert("document_id".to_string(), json!(state.document_id));

        let chunker = new_chunker(state.category, self.config)?;
        let output = chunker.chunk_document(&content, &flat)?;

        let chunks_json = serde_json::to_string_pretty(&output.chunks)?;
        storage.write_artifact(state.category, &state.document_id, "chunks.json", &chunks_json)?;

        let mut meta = Map::new();
        meta.insert("chunks_generated".to_string(), json!(output.chunks.len()));
        meta.insert("chunks_file".to_string(), json!("chunks.json"));
        meta.insert("splitter_stats".to_string(), serde_json::to_value(output.stats)?);
        Ok(meta)
    }
}

fn new_chunker(category: Category, config: SplitterConfig) -> Result<Chunker> {
    Chunker::new(category, config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pipeline::stage::run_stage;

    #[tokio::test]
    async fn test_chunk_stage_always_runs_and_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("stages"), dir.path().join(".rejected"));
        let mut state = PipelineState::new(Category::Regulation, "doc-1");

        storage
            .write_artifact(
                Category::Regulation,
                "doc-1",
                "metadata.json",
                r#"{"title": "Quy chế", "keywords": ["đào tạo", "tín chỉ"], "is_index_page": false}"#,
            )
            .unwrap();

        let input = dir.path().join("05-fixed.md");
        std::fs::write(
            &input,
            "# CHƯƠNG I - QUY ĐỊNH CHUNG\n\n## Điều 1. Phạm vi\n\nNội dung điều một.\n",
        )
        .unwrap();

        let stage = ChunkStage::new(SplitterConfig::default());

        let first = run_stage(&stage, &storage, &mut state, &input, false)
            .await
            .unwrap();
        assert!(first.executed);
        let first_chunks = storage
            .read_artifact(Category::Regulation, "doc-1", "chunks.json")
            .unwrap();

        // Second run executes again (always_rerun) and reproduces the file
        // byte for byte.
        let second = run_stage(&stage, &storage, &mut state, &input, false)
            .await
            .unwrap();
        assert!(second.executed);
        let second_chunks = storage
            .read_artifact(Category::Regulation, "doc-1", "chunks.json")
            .unwrap();
        assert_eq!(first_chunks, second_chunks);

        // Flattened metadata reached the chunks.
        let chunks: Vec<crate::types::Chunk> = serde_json::from_str(&first_chunks).unwrap();
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].metadata["category"], json!("regulation"));
        assert_eq!(chunks[0].metadata["keywords"], json!("đào tạo, tín chỉ"));
        assert_eq!(chunks[0].metadata["is_index_page"], json!("false"));
    }
}
