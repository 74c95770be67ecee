//! Pipeline orchestration.
//!
//! Two pipelines share the stage runner:
//!
//! - **Processing**: `parse → clean → normalize → filter → fix-markdown →
//!   metadata` — raw file to clean markdown plus metadata JSON.
//! - **Indexing**: `chunk → embed-index` — final markdown to vector
//!   collection.
//!
//! Both support incremental execution (skip completed stages with matching
//! input hashes), cost accumulation, and short-circuit on fatal errors.

pub mod stage;
pub mod stages;

use crate::chunker::SplitterConfig;
use crate::fixer::MarkdownFixer;
use crate::llm::{DocumentParser, Embedder};
use crate::metadata::MetadataGenerator;
use crate::state::PipelineState;
use crate::storage::Storage;
use crate::types::Category;
use crate::vector::VectorStore;
use crate::{Error, Result};
use stage::{Stage, StageRunResult, run_stage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Final-markdown precedence, newest structural artifact first.
const FINAL_MARKDOWN_PRECEDENCE: [&str; 6] = [
    "06-flattened.md",
    "05-fixed.md",
    "04-filtered.md",
    "03-normalized.md",
    "02-cleaned.md",
    "01-parsed.md",
];

/// Resolve the final markdown artifact for a document.
pub fn final_markdown_path(
    storage: &Storage,
    category: Category,
    document_id: &str,
) -> Result<PathBuf> {
    for filename in FINAL_MARKDOWN_PRECEDENCE {
        let candidate = storage.artifact_path(category, document_id, filename)?;
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(Error::NotFound(format!(
        "No final markdown for {}/{document_id}; run the processing pipeline first",
        category.as_str()
    )))
}

/// Summary of one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineSummary {
    /// Stages whose execute step ran.
    pub stages_run: Vec<String>,
    /// Stages skipped by the incremental check.
    pub stages_skipped: Vec<String>,
    /// Total cost of executed stages in USD.
    pub total_cost: f64,
}

/// External services the processing pipeline depends on.
pub struct ProcessingServices {
    /// Remote document parser.
    pub parser: Arc<dyn DocumentParser>,
    /// Markdown structure fixer.
    pub fixer: Arc<MarkdownFixer>,
    /// Category-specific metadata generator.
    pub metadata_generator: Arc<dyn MetadataGenerator>,
}

/// Orchestrator for the processing pipeline of one document.
pub struct ProcessingPipeline {
    storage: Storage,
    state: PipelineState,
    source_file: PathBuf,
    stages: Vec<Box<dyn Stage>>,
}

impl ProcessingPipeline {
    /// Create the pipeline, loading (or initializing) the document's state.
    pub fn new(
        storage: Storage,
        category: Category,
        document_id: &str,
        source_file: PathBuf,
        services: ProcessingServices,
    ) -> Result<Self> {
        let mut state = PipelineState::load(&storage, category, document_id)?;
        if state.source_file.is_none() {
            state.source_file = source_file
                .file_name()
                .and_then(|n| n.to_str())
                .map(String::from);
        }

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(stages::ParseStage::new(services.parser)),
            Box::new(stages::CleanStage),
            Box::new(stages::NormalizeStage),
            Box::new(stages::FilterStage),
            Box::new(stages::FixMarkdownStage::new(services.fixer)),
            Box::new(stages::MetadataStage::new(services.metadata_generator)),
        ];

        Ok(Self {
            storage,
            state,
            source_file,
            stages,
        })
    }

    /// Current pipeline state.
    #[must_use]
    pub const fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Run all stages in order.
    pub async fn run(&mut self, force: bool) -> Result<PipelineSummary> {
        info!(
            "Running processing pipeline for {}/{}",
            self.state.category.as_str(),
            self.state.document_id
        );

        let mut summary = PipelineSummary::default();
        let names: Vec<&'static str> = self.stages.iter().map(|s| s.name()).collect();
        for name in names {
            let result = self.run_stage(name, force).await?;
            if result.executed {
                summary.total_cost += result.cost;
                summary.stages_run.push(name.to_string());
            } else {
                summary.stages_skipped.push(name.to_string());
            }
        }

        info!(
            "Processing pipeline completed: {} run, {} skipped, cost ${:.4}",
            summary.stages_run.len(),
            summary.stages_skipped.len(),
            summary.total_cost
        );
        Ok(summary)
    }

    /// Run one stage by name.
    pub async fn run_stage(&mut self, name: &str, force: bool) -> Result<StageRunResult> {
        let position = self
            .stages
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| Error::Input(format!("Invalid stage name: {name}")))?;

        let input_path = if position == 0 {
            self.source_file.clone()
        } else {
            let previous = &self.stages[position - 1];
            let filename = previous.output_filename().ok_or_else(|| {
                Error::Input(format!("Stage before '{name}' has no file output"))
            })?;
            self.storage
                .artifact_path(self.state.category, &self.state.document_id, filename)?
        };

        run_stage(
            self.stages[position].as_ref(),
            &self.storage,
            &mut self.state,
            &input_path,
            force,
        )
        .await
    }
}

/// Orchestrator for the indexing pipeline of one document.
pub struct IndexingPipeline {
    storage: Storage,
    state: PipelineState,
    chunk_stage: stages::ChunkStage,
    embed_stage: stages::EmbedIndexStage,
}

impl IndexingPipeline {
    /// Create the pipeline, loading the document's state.
    pub fn new(
        storage: Storage,
        category: Category,
        document_id: &str,
        splitter: SplitterConfig,
        embedder: Arc<dyn Embedder>,
        store: VectorStore,
        embed_unit_price: f64,
    ) -> Result<Self> {
        let state = PipelineState::load(&storage, category, document_id)?;
        Ok(Self {
            storage,
            state,
            chunk_stage: stages::ChunkStage::new(splitter),
            embed_stage: stages::EmbedIndexStage::new(embedder, store, embed_unit_price),
        })
    }

    /// Current pipeline state.
    #[must_use]
    pub const fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Run `chunk` then `embed-index`.
    pub async fn run(&mut self, force: bool) -> Result<PipelineSummary> {
        info!(
            "Running indexing pipeline for {}/{}",
            self.state.category.as_str(),
            self.state.document_id
        );

        let mut summary = PipelineSummary::default();
        for name in ["chunk", "embed-index"] {
            let result = self.run_stage(name, force).await?;
            if result.executed {
                summary.total_cost += result.cost;
                summary.stages_run.push(name.to_string());
            } else {
                summary.stages_skipped.push(name.to_string());
            }
        }
        Ok(summary)
    }

    /// Run one indexing stage by name.
    pub async fn run_stage(&mut self, name: &str, force: bool) -> Result<StageRunResult> {
        match name {
            "chunk" => {
                let input =
                    final_markdown_path(&self.storage, self.state.category, &self.state.document_id)?;
                run_stage(
                    &self.chunk_stage,
                    &self.storage,
                    &mut self.state,
                    &input,
                    force,
                )
                .await
            },
            "embed-index" => {
                let input = self.storage.artifact_path(
                    self.state.category,
                    &self.state.document_id,
                    "chunks.json",
                )?;
                if !input.exists() {
                    return Err(Error::Input(
                        "chunks.json not found; run the chunk stage first".to_string(),
                    ));
                }
                run_stage(
                    &self.embed_stage,
                    &self.storage,
                    &mut self.state,
                    &input,
                    force,
                )
                .await
            },
            other => Err(Error::Input(format!("Invalid stage name: {other}"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::llm::{Completer, ParsedDocument};
    use async_trait::async_trait;
    use std::path::Path;

    struct StubParser;

    #[async_trait]
    impl DocumentParser for StubParser {
        async fn parse(&self, _path: &Path) -> Result<ParsedDocument> {
            let mut markdown = String::from(
                "# QUY CHẾ ĐÀO TẠO THEO HỌC CHẾ TÍN CHỈ\n\n\
                 # CHƯƠNG I - NHỮNG QUY ĐỊNH CHUNG\n\n",
            );
            for i in 1..=8 {
                markdown.push_str(&format!(
                    "## Điều {i}. Nội dung điều {i}\n\nĐiều này quy định chi tiết \
                     về việc tổ chức đào tạo và đánh giá kết quả học tập của \
                     sinh viên hệ chính quy theo học chế tín chỉ, bao gồm các \
                     yêu cầu về tín chỉ tích lũy và chuẩn đầu ra số {i}.\n\n"
                ));
            }
            Ok(ParsedDocument {
                markdown,
                cost: 0.05,
            })
        }
    }

    struct EchoCompleter;

    #[async_trait]
    impl Completer for EchoCompleter {
        async fn complete(&self, prompt: &str) -> Result<String> {
            // The fixer sends the document wrapped in a prompt; metadata asks
            // for JSON. Tell them apart by the JSON instruction.
            if prompt.contains("Trích xuất JSON") {
                Ok(r#"{"title": "Quy chế đào tạo", "year": 2022,
                       "summary": "Quy chế", "keywords": ["đào tạo"],
                       "document_type": "original",
                       "effective_date": null, "is_index_page": false,
                       "base_regulation_code": null}"#
                    .to_string())
            } else {
                let start = prompt.find("```markdown\n").map_or(0, |i| i + 12);
                let end = prompt[start..]
                    .find("\n```")
                    .map_or(prompt.len(), |i| start + i);
                Ok(prompt[start..end].to_string())
            }
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    #[allow(clippy::cast_precision_loss)]
                    let len = t.chars().count() as f32;
                    vec![len, 1.0]
                })
                .collect())
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    fn services() -> ProcessingServices {
        let completer: Arc<dyn Completer> = Arc::new(EchoCompleter);
        ProcessingServices {
            parser: Arc::new(StubParser),
            fixer: Arc::new(MarkdownFixer::new(Arc::clone(&completer), 600)),
            metadata_generator: Arc::new(crate::metadata::RegulationMetadataGenerator::new(
                completer,
                Arc::new(tokio::sync::Mutex::new(crate::metadata::RegulationCodes::load(
                    std::env::temp_dir().join("sotay-test-codes.json"),
                ))),
            )),
        }
    }

    /// End-to-end rerun semantics: first run executes everything, second run
    /// skips all processing stages, reruns chunk (always), skips embed-index.
    #[tokio::test]
    async fn test_rerun_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("stages"), dir.path().join(".rejected"));

        let source = dir.path().join("790-qd-dhcntt_quy_che.pdf");
        std::fs::write(&source, b"%PDF-1.4 fake body").unwrap();

        let codes_path = dir.path().join("codes.json");
        let completer: Arc<dyn Completer> = Arc::new(EchoCompleter);
        let build_services = || ProcessingServices {
            parser: Arc::new(StubParser),
            fixer: Arc::new(MarkdownFixer::new(Arc::clone(&completer), 600)),
            metadata_generator: Arc::new(crate::metadata::RegulationMetadataGenerator::new(
                Arc::clone(&completer),
                Arc::new(tokio::sync::Mutex::new(
                    crate::metadata::RegulationCodes::load(&codes_path),
                )),
            )),
        };

        let mut processing = ProcessingPipeline::new(
            storage.clone(),
            Category::Regulation,
            "790-qd-dhcntt",
            source.clone(),
            build_services(),
        )
        .unwrap();
        let summary = processing.run(false).await.unwrap();
        assert_eq!(
            summary.stages_run,
            vec!["parse", "clean", "normalize", "filter", "fix-markdown", "metadata"]
        );
        assert!(summary.total_cost > 0.0);

        let store = VectorStore::open_in_memory().await.unwrap();
        let mut indexing = IndexingPipeline::new(
            storage.clone(),
            Category::Regulation,
            "790-qd-dhcntt",
            SplitterConfig::default(),
            Arc::new(StubEmbedder),
            store.clone(),
            0.02,
        )
        .unwrap();
        let summary = indexing.run(false).await.unwrap();
        assert_eq!(summary.stages_run, vec!["chunk", "embed-index"]);
        assert!(store.count("regulation").await.unwrap() > 0);

        // Second run: everything skips except chunk.
        let mut processing = ProcessingPipeline::new(
            storage.clone(),
            Category::Regulation,
            "790-qd-dhcntt",
            source,
            build_services(),
        )
        .unwrap();
        let summary = processing.run(false).await.unwrap();
        assert!(summary.stages_run.is_empty());
        assert_eq!(summary.stages_skipped.len(), 6);

        let mut indexing = IndexingPipeline::new(
            storage,
            Category::Regulation,
            "790-qd-dhcntt",
            SplitterConfig::default(),
            Arc::new(StubEmbedder),
            store,
            0.02,
        )
        .unwrap();
        let summary = indexing.run(false).await.unwrap();
        assert_eq!(summary.stages_run, vec!["chunk"]);
        assert_eq!(summary.stages_skipped, vec!["embed-index"]);
    }

    #[tokio::test]
    async fn test_final_markdown_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("stages"), dir.path().join(".rejected"));

        assert!(final_markdown_path(&storage, Category::Regulation, "doc-x").is_err());

        storage
            .write_artifact(Category::Regulation, "doc-x", "01-parsed.md", "a")
            .unwrap();
        storage
            .write_artifact(Category::Regulation, "doc-x", "05-fixed.md", "b")
            .unwrap();
        let path = final_markdown_path(&storage, Category::Regulation, "doc-x").unwrap();
        assert!(path.ends_with("05-fixed.md"));

        storage
            .write_artifact(Category::Regulation, "doc-x", "06-flattened.md", "c")
            .unwrap();
        let path = final_markdown_path(&storage, Category::Regulation, "doc-x").unwrap();
        assert!(path.ends_with("06-flattened.md"));
    }

    #[tokio::test]
    async fn test_invalid_stage_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("stages"), dir.path().join(".rejected"));
        let source = dir.path().join("x.pdf");
        std::fs::write(&source, b"data").unwrap();

        let mut pipeline = ProcessingPipeline::new(
            storage,
            Category::Regulation,
            "doc-x",
            source,
            services(),
        )
        .unwrap();
        assert!(pipeline.run_stage("no-such-stage", false).await.is_err());
    }
}
