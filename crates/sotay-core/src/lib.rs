//! # sotay-core
//!
//! Core library for sotay — the knowledge-processing and retrieval substrate
//! behind a university regulations-and-curricula assistant.
//!
//! Two halves share one set of types:
//!
//! - **Pipeline**: a resumable, stage-based document pipeline
//!   (`parse → clean → normalize → filter → fix-markdown → metadata`, then
//!   `chunk → embed-index`) with per-document state sidecars, input-hash
//!   change detection, cost tracking, and manual-edit locking.
//! - **Retrieval**: a blended engine that expands queries (HyDE), searches
//!   dense and lexical indexes, dedupes, reranks on a remote GPU endpoint,
//!   applies program-disambiguation filtering, and formats structured
//!   results.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sotay_core::{Config, Storage, state::PipelineState, types::Category};
//!
//! # fn main() -> sotay_core::Result<()> {
//! let config = Config::load()?;
//! let storage = Storage::new(&config.paths.stages_root, &config.paths.rejected_root);
//!
//! let state = PipelineState::load(&storage, Category::Regulation, "790-qd-dhcntt")?;
//! println!("{}", state.status_summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! The retrieval engine is per-request stateless: retrievers, the reranker
//! client, and the vector-store handle are safe to share across requests
//! after initialization. The pipeline is single-writer per document —
//! callers fan out across `(category, document_id)` pairs, never within
//! one.

/// Structure-aware chunking for regulation and curriculum markdown.
pub mod chunker;
/// Configuration loading and defaults.
pub mod config;
/// Error types and result alias.
pub mod error;
/// LLM-driven markdown structure repair.
pub mod fixer;
/// BM25 lexical index over the chunk corpus.
pub mod lexical;
/// Narrow interfaces over language-model providers.
pub mod llm;
/// Category-specific metadata extraction.
pub mod metadata;
/// Pipeline orchestration and stages.
pub mod pipeline;
/// Blended retrieval engine.
pub mod retrieval;
/// Per-document pipeline state tracking.
pub mod state;
/// Local filesystem storage for pipeline artifacts.
pub mod storage;
/// Core data types.
pub mod types;
/// Persistent vector store over SQLite + sqlite-vec.
pub mod vector;

// Re-export commonly used types
pub use config::{Config, RetrievalConfig, RoutingConfig, RoutingStrategy};
pub use error::{Error, Result};
pub use lexical::LexicalIndex;
pub use retrieval::{RetrievalResult, Retriever, Router, RoutingDecision};
pub use storage::Storage;
pub use types::{Category, Chunk, ChunkMetadata, ScoredNode};
pub use vector::VectorStore;
