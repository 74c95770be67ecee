//! sotay MCP server
//!
//! Exposes the retrieval engine and the student-portal collaborator as MCP
//! tools over stdio. Tool calls fan out in parallel with per-call timeouts;
//! individual failures come back as typed tool errors.

pub mod error;
pub mod host;
pub mod portal;
pub mod server;
pub mod tools;

pub use error::{McpError, McpResult};
pub use host::{ToolCall, ToolHost, ToolMessage};
pub use portal::PortalClient;
pub use server::McpServer;

use sotay_core::llm;
use sotay_core::{Config, LexicalIndex, Retriever, Router, RoutingStrategy, Storage, VectorStore};
use std::sync::Arc;
use std::time::Duration;

/// Build the tool host from configuration.
///
/// Opens the vector store, builds the BM25 corpus when lexical blending is
/// on, and wires the reranker/HyDE components per config.
pub async fn build_host(config: &Config) -> McpResult<Arc<ToolHost>> {
    let storage = Storage::new(&config.paths.stages_root, &config.paths.rejected_root);
    let store = VectorStore::open(&config.paths.vector_store_path).await?;
    let embedder = llm::embedder(&config.llm, &config.indexing.embed_model)?;

    let lexical = if config.retrieval.use_lexical {
        Some(Arc::new(LexicalIndex::build(&storage)?))
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
        Some(sotay_core::retrieval::HydeExpander::new(llm::hyde_completer(
            &config.llm,
        )?))
    } else {
        None
    };

    let retriever = Arc::new(Retriever::new(
        store,
        embedder,
        lexical,
        reranker,
        hyde,
        config.retrieval.clone(),
    ));

    let router = match config.routing.strategy {
        RoutingStrategy::QueryAll => {
            Router::query_all(config.routing.available_collections.clone())
        },
        RoutingStrategy::LlmClassification => Router::llm_classification(
            config.routing.available_collections.clone(),
            llm::classification_completer(&config.llm)?,
        ),
    };

    let portal = config
        .portal
        .base_url
        .as_deref()
        .map(|url| {
            Arc::new(PortalClient::new(
                url,
                Duration::from_secs(config.portal.tool_timeout_secs),
            ))
        });

    Ok(Arc::new(ToolHost::new(
        retriever,
        Arc::new(router),
        portal,
        Duration::from_secs(config.portal.tool_timeout_secs),
    )))
}

/// Main entry point for the MCP server binary.
pub async fn serve_stdio() -> McpResult<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::debug!("initializing sotay MCP server");

    let config = Config::load()?;
    let host = build_host(&config).await?;
    let server = McpServer::new(host);
    server.serve_stdio().await
}
