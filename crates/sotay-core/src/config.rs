//! Configuration management for the sotay pipeline and retrieval engine.
//!
//! Configuration is stored as TOML and loaded from (searched in order):
//! - `$SOTAY_CONFIG` (explicit file path)
//! - XDG: `$XDG_CONFIG_HOME/sotay/config.toml` or `~/.config/sotay/config.toml`
//! - Dotfile fallback: `~/.sotay/config.toml`
//!
//! Missing file means defaults. Every section has serde defaults so partial
//! configs stay valid across versions.
//!
//! ## Example Configuration File
//!
//! ```toml
//! [paths]
//! stages_root = "data/stages"
//! vector_store_path = "data/vector_store/sotay.db"
//!
//! [retrieval]
//! retrieval_top_k = 20
//! top_k = 3
//! rerank_score_threshold = 0.7
//! reranker_url = "https://reranker.example.com/rerank"
//! use_hyde = false
//!
//! [routing]
//! strategy = "llm_classification"
//! available_collections = ["regulation", "curriculum"]
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_stages_root() -> PathBuf {
    PathBuf::from("data/stages")
}

fn default_rejected_root() -> PathBuf {
    PathBuf::from("data/.rejected")
}

fn default_vector_store_path() -> PathBuf {
    PathBuf::from("data/vector_store/sotay.db")
}

fn default_regulation_codes_path() -> PathBuf {
    PathBuf::from("data/regulation_codes.json")
}

const fn default_max_tokens() -> usize {
    8000
}

const fn default_sub_chunk_size() -> usize {
    1024
}

const fn default_sub_chunk_overlap() -> usize {
    200
}

const fn default_max_header_level() -> usize {
    4
}

fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}

/// USD per 1M embedding tokens (text-embedding-3-small pricing).
const fn default_embed_unit_price() -> f64 {
    0.02
}

const fn default_retrieval_top_k() -> usize {
    20
}

const fn default_top_k() -> usize {
    3
}

const fn default_min_score_threshold() -> f32 {
    0.25
}

const fn default_rerank_score_threshold() -> f32 {
    0.7
}

const fn default_reranker_timeout_secs() -> u64 {
    120
}

const fn default_tool_timeout_secs() -> u64 {
    120
}

const fn default_fixer_rpm() -> u32 {
    15
}

fn default_routing_strategy() -> RoutingStrategy {
    RoutingStrategy::QueryAll
}

fn default_available_collections() -> Vec<String> {
    vec!["regulation".to_string(), "curriculum".to_string()]
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_classification_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_hyde_model() -> String {
    "gpt-4.1-nano".to_string()
}

fn default_metadata_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_fixer_model() -> String {
    "gemini-2.0-flash".to_string()
}

/// Top-level configuration for the pipeline, indexing, and retrieval layers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// File system paths.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Chunking and embedding settings.
    #[serde(default)]
    pub indexing: IndexingConfig,
    /// Blended retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Collection routing settings.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Student-portal collaborator settings.
    #[serde(default)]
    pub portal: PortalConfig,
}

/// File system paths used by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of per-document stage directories (`{root}/{category}/{doc_id}/`).
    #[serde(default = "default_stages_root")]
    pub stages_root: PathBuf,

    /// Area where the filter stage copies rejected content.
    #[serde(default = "default_rejected_root")]
    pub rejected_root: PathBuf,

    /// SQLite database file backing the vector store.
    #[serde(default = "default_vector_store_path")]
    pub vector_store_path: PathBuf,

    /// Lookup table mapping regulation-code prefixes to canonical codes.
    #[serde(default = "default_regulation_codes_path")]
    pub regulation_codes_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            stages_root: default_stages_root(),
            rejected_root: default_rejected_root(),
            vector_store_path: default_vector_store_path(),
            regulation_codes_path: default_regulation_codes_path(),
        }
    }
}

/// Chunking and embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Maximum tokens per chunk before sub-chunking kicks in.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Target token size for sub-chunks of oversized chunks.
    #[serde(default = "default_sub_chunk_size")]
    pub sub_chunk_size: usize,

    /// Token overlap carried between consecutive sub-chunks.
    #[serde(default = "default_sub_chunk_overlap")]
    pub sub_chunk_overlap: usize,

    /// Deepest markdown header level treated as a chunk boundary.
    #[serde(default = "default_max_header_level")]
    pub max_header_level: usize,

    /// Embedding model identifier sent to the embedding service.
    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    /// USD per 1M embedding tokens, used for cost estimates.
    #[serde(default = "default_embed_unit_price")]
    pub embed_unit_price: f64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            sub_chunk_size: default_sub_chunk_size(),
            sub_chunk_overlap: default_sub_chunk_overlap(),
            max_header_level: default_max_header_level(),
            embed_model: default_embed_model(),
            embed_unit_price: default_embed_unit_price(),
        }
    }
}

/// Blended retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates fetched from each index before reranking.
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,

    /// Final number of documents returned.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum raw similarity for dense candidates.
    #[serde(default = "default_min_score_threshold")]
    pub min_score_threshold: f32,

    /// Minimum reranker score kept after reranking.
    #[serde(default = "default_rerank_score_threshold")]
    pub rerank_score_threshold: f32,

    /// Remote reranker HTTP endpoint. `None` disables reranking.
    #[serde(default)]
    pub reranker_url: Option<String>,

    /// Timeout for one reranker call. Generous to ride out GPU cold starts.
    #[serde(default = "default_reranker_timeout_secs")]
    pub reranker_timeout_secs: u64,

    /// Expand queries with a hypothetical document before embedding.
    #[serde(default)]
    pub use_hyde: bool,

    /// Blend BM25 lexical candidates into retrieval.
    #[serde(default)]
    pub use_lexical: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            retrieval_top_k: default_retrieval_top_k(),
            top_k: default_top_k(),
            min_score_threshold: default_min_score_threshold(),
            rerank_score_threshold: default_rerank_score_threshold(),
            reranker_url: None,
            reranker_timeout_secs: default_reranker_timeout_secs(),
            use_hyde: false,
            use_lexical: false,
        }
    }
}

/// Strategy used to select collections for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Query every available collection.
    QueryAll,
    /// Classify the query with a fast LLM and route accordingly.
    LlmClassification,
}

/// Collection routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Routing strategy.
    #[serde(default = "default_routing_strategy")]
    pub strategy: RoutingStrategy,

    /// Collections the router may choose from.
    #[serde(default = "default_available_collections")]
    pub available_collections: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: default_routing_strategy(),
            available_collections: default_available_collections(),
        }
    }
}

/// LLM provider settings.
///
/// The rest of the crate reaches language models only through the narrow
/// [`crate::llm`] interfaces; this section is what the factory consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Fast model used for query classification (temperature 0).
    #[serde(default = "default_classification_model")]
    pub classification_model: String,

    /// Small model used for hypothetical-document generation.
    #[serde(default = "default_hyde_model")]
    pub hyde_model: String,

    /// Model used for structured metadata extraction (temperature 0).
    #[serde(default = "default_metadata_model")]
    pub metadata_model: String,

    /// Model used for markdown structure repair.
    #[serde(default = "default_fixer_model")]
    pub fixer_model: String,

    /// Requests per minute allowed against the fixer model's free tier.
    #[serde(default = "default_fixer_rpm")]
    pub fixer_rpm: u32,

    /// Remote document-parser endpoint (PDF/DOCX to markdown).
    #[serde(default)]
    pub parser_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: None,
            classification_model: default_classification_model(),
            hyde_model: default_hyde_model(),
            metadata_model: default_metadata_model(),
            fixer_model: default_fixer_model(),
            fixer_rpm: default_fixer_rpm(),
            parser_url: None,
        }
    }
}

/// Student-portal collaborator settings (grades/schedule scraping service).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Base URL of the portal scraper service.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-tool timeout in seconds for portal and retrieval tools.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the default locations, or defaults if absent.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("SOTAY_CONFIG") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Self::load_from(Path::new(trimmed));
            }
        }

        for candidate in Self::candidate_paths() {
            if candidate.exists() {
                return Self::load_from(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {e}")))?;
        }
        let toml = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        fs::write(path, toml)
            .map_err(|e| Error::Config(format!("Failed to write {}: {e}", path.display())))?;
        Ok(())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            let trimmed = xdg.trim();
            if !trimmed.is_empty() {
                candidates.push(PathBuf::from(trimmed).join("sotay").join("config.toml"));
            }
        }

        if let Some(base) = directories::BaseDirs::new() {
            candidates.push(base.home_dir().join(".config/sotay/config.toml"));
            candidates.push(base.home_dir().join(".sotay/config.toml"));
        }

        candidates
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.indexing.max_tokens, 8000);
        assert_eq!(config.indexing.sub_chunk_size, 1024);
        assert_eq!(config.indexing.sub_chunk_overlap, 200);
        assert_eq!(config.indexing.max_header_level, 4);
        assert_eq!(config.retrieval.retrieval_top_k, 20);
        assert_eq!(config.retrieval.top_k, 3);
        assert!((config.retrieval.min_score_threshold - 0.25).abs() < f32::EPSILON);
        assert!((config.retrieval.rerank_score_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.reranker_timeout_secs, 120);
        assert!(!config.retrieval.use_hyde);
        assert!(!config.retrieval.use_lexical);
        assert_eq!(config.routing.strategy, RoutingStrategy::QueryAll);
        assert_eq!(
            config.routing.available_collections,
            vec!["regulation", "curriculum"]
        );
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [retrieval]
            top_k = 5
            use_hyde = true

            [routing]
            strategy = "llm_classification"
            "#,
        )
        .unwrap();

        assert_eq!(config.retrieval.top_k, 5);
        assert!(config.retrieval.use_hyde);
        assert_eq!(config.retrieval.retrieval_top_k, 20);
        assert_eq!(config.routing.strategy, RoutingStrategy::LlmClassification);
        assert_eq!(config.indexing.max_tokens, 8000);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.reranker_url = Some("https://rerank.example.com".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(
            loaded.retrieval.reranker_url.as_deref(),
            Some("https://rerank.example.com")
        );
    }
}
