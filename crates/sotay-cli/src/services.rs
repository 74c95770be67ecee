//! Service wiring from configuration.

use anyhow::Result;
use sotay_core::chunker::SplitterConfig;
use sotay_core::fixer::MarkdownFixer;
use sotay_core::llm;
use sotay_core::metadata::{self, RegulationCodes};
use sotay_core::pipeline::ProcessingServices;
use sotay_core::types::Category;
use sotay_core::{Config, LexicalIndex, Retriever, Router, RoutingStrategy, Storage, VectorStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Storage rooted at the configured paths.
#[must_use]
pub fn storage(config: &Config) -> Storage {
    Storage::new(&config.paths.stages_root, &config.paths.rejected_root)
}

/// Splitter settings from the indexing config.
#[must_use]
pub const fn splitter_config(config: &Config) -> SplitterConfig {
    SplitterConfig {
        max_tokens: config.indexing.max_tokens,
        sub_chunk_size: config.indexing.sub_chunk_size,
        sub_chunk_overlap: config.indexing.sub_chunk_overlap,
        max_header_level: config.indexing.max_header_level,
    }
}

/// Build the processing-pipeline services for a category.
pub fn processing_services(config: &Config, category: Category) -> Result<ProcessingServices> {
    let codes = Arc::new(Mutex::new(RegulationCodes::load(
        &config.paths.regulation_codes_path,
    )));

    Ok(ProcessingServices {
        parser: llm::document_parser(&config.llm)?,
        fixer: Arc::new(MarkdownFixer::new(
            llm::fixer_completer(&config.llm)?,
            config.llm.fixer_rpm,
        )),
        metadata_generator: metadata::generator_for(
            category,
            llm::metadata_completer(&config.llm)?,
            codes,
        ),
    })
}

/// Build the retrieval engine from configuration.
pub async fn retriever(config: &Config) -> Result<Retriever> {
    let store = VectorStore::open(&config.paths.vector_store_path).await?;
    let embedder = llm::embedder(&config.llm, &config.indexing.embed_model)?;

    let lexical = if config.retrieval.use_lexical {
        Some(Arc::new(LexicalIndex::build(&storage(config))?))
    } else {
        None
    };

    let reranker = config.retrieval.reranker_url.as_deref().map(|url| {
        sotay_core::retrieval::RerankerClient::new(
            url,
            Duration::from_secs(config.retrieval.reranker_timeout_secs),
        )
    });

    let hyde = if config.retrieval.use_hyde {
        Some(sotay_core::retrieval::HydeExpander::new(
            llm::hyde_completer(&config.llm)?,
        ))
    } else {
        None
    };

    Ok(Retriever::new(
        store,
        embedder,
        lexical,
        reranker,
        hyde,
        config.retrieval.clone(),
    ))
}

/// Build the router from configuration.
pub fn router(config: &Config) -> Result<Router> {
    Ok(match config.routing.strategy {
        RoutingStrategy::QueryAll => {
            Router::query_all(config.routing.available_collections.clone())
        },
        RoutingStrategy::LlmClassification => Router::llm_classification(
            config.routing.available_collections.clone(),
            llm::classification_completer(&config.llm)?,
        ),
    })
}
