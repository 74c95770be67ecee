//! Embed-index stage: embed chunks and upsert into the vector store.

use crate::llm::Embedder;
use crate::pipeline::stage::Stage;
use crate::state::PipelineState;
use crate::storage::Storage;
use crate::types::{Chunk, flatten_metadata_value};
use crate::vector::VectorStore;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Embedding batch size per API call.
const EMBED_BATCH: usize = 64;

/// Flat token estimate per chunk used for the cost report.
const TOKENS_PER_CHUNK_ESTIMATE: usize = 200;

/// Embeds `chunks.json` and indexes into the per-category collection.
/// Costly (embedding API); idempotent via delete-then-insert.
pub struct EmbedIndexStage {
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    unit_price: f64,
}

impl EmbedIndexStage {
    /// Create the stage over the shared embedder and vector store.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, store: VectorStore, unit_price: f64) -> Self {
        Self {
            embedder,
            store,
            unit_price,
        }
    }
}

#[async_trait]
impl Stage for EmbedIndexStage {
    fn name(&self) -> &'static str {
        "embed-index"
    }

    fn is_costly(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Embed chunks and index to the vector store"
    }

    fn output_filename(&self) -> Option<&'static str> {
        None
    }

    async fn execute(
        &self,
        input_path: &Path,
        _output_path: Option<&Path>,
        state: &mut PipelineState,
        _storage: &Storage,
    ) -> Result<Map<String, Value>> {
        let raw = std::fs::read_to_string(input_path)?;
        let mut chunks: Vec<Chunk> = serde_json::from_str(&raw)
            .map_err(|e| Error::Input(format!("chunks.json is malformed: {e}")))?;

        if chunks.is_empty() {
            return Err(Error::Input("chunks.json holds no chunks".to_string()));
        }

        // Re-sanitize metadata: chunks.json may have been hand-edited.
        for chunk in &mut chunks {
            for value in chunk.metadata.values_mut() {
                *value = flatten_metadata_value(value);
            }
        }

        let collection = state.category.as_str();

        // Delete-then-insert; a missing document is fine.
        if let Err(e) = self.store.delete_document(collection, &state.document_id).await {
            warn!("Pre-index delete failed (continuing): {e}");
        }

        let mut embedded: Vec<(Chunk, Vec<f32>)> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            for (chunk, vector) in batch.iter().cloned().zip(vectors) {
                embedded.push((chunk, vector));
            }
        }

        let node_count = embedded.len();
        self.store
            .insert_chunks(collection, &state.document_id, embedded)
            .await?;
        debug!("Indexed {node_count} chunks into '{collection}'");

        #[allow(clippy::cast_precision_loss)]
        let cost =
            (node_count * TOKENS_PER_CHUNK_ESTIMATE) as f64 / 1_000_000.0 * self.unit_price;

        let mut metadata = Map::new();
        metadata.insert("nodes_indexed".to_string(), json!(node_count));
        metadata.insert("collection".to_string(), json!(collection));
        metadata.insert("embed_model".to_string(), json!(self.embedder.model()));
        metadata.insert("cost".to_string(), json!(cost));
        Ok(metadata)
    }
}
