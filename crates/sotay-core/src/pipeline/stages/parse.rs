//! Parse stage: binary source document to markdown.

use crate::llm::DocumentParser;
use crate::pipeline::stage::Stage;
use crate::state::PipelineState;
use crate::storage::Storage;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;

/// Converts a PDF/DOCX/XLSX source file into `01-parsed.md` through the
/// external parser service. Costly: every call bills.
pub struct ParseStage {
    parser: Arc<dyn DocumentParser>,
}

impl ParseStage {
    /// Create the stage over a parser client.
    #[must_use]
    pub fn new(parser: Arc<dyn DocumentParser>) -> Self {
        Self { parser }
    }
}

#[async_trait]
impl Stage for ParseStage {
    fn name(&self) -> &'static str {
        "parse"
    }

    fn is_costly(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Parse source document to markdown"
    }

    fn output_filename(&self) -> Option<&'static str> {
        Some("01-parsed.md")
    }

    async fn execute(
        &self,
        input_path: &Path,
        output_path: Option<&Path>,
        _state: &mut PipelineState,
        _storage: &Storage,
    ) -> Result<Map<String, Value>> {
        let parsed = self.parser.parse(input_path).await?;

        if parsed.markdown.trim().is_empty() {
            return Err(Error::Stage {
                stage: "parse".to_string(),
                message: "parser produced empty markdown".to_string(),
            });
        }

        if let Some(path) = output_path {
            crate::storage::write_atomic(path, &parsed.markdown)?;
        }

        let mut metadata = Map::new();
        metadata.insert("cost".to_string(), json!(parsed.cost));
        metadata.insert("chars".to_string(), json!(parsed.markdown.chars().count()));
        Ok(metadata)
    }
}
