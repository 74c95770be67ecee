//! Narrow interfaces over language-model providers.
//!
//! The rest of the crate never names a provider: it sees three small traits
//! plus a document-parser contract, and a factory that maps configuration to
//! concrete implementations. Retries, timeouts, and rate limiting are the
//! implementation's concern.

mod openai;
mod parser;

pub use openai::{OpenAiCompleter, OpenAiEmbedder};
pub use parser::{HttpDocumentParser, ParsedDocument};

use crate::config::LlmConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Text completion over a single prompt.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Complete a prompt and return the model's text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model identifier, for logs and stage metadata.
    fn model(&self) -> &str;
}

/// Batch text embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts; one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Model identifier, for logs and stage metadata.
    fn model(&self) -> &str;
}

/// Conversion of a binary source document (PDF/DOCX/XLSX) to markdown.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse a file into markdown, returning the text and the call's cost in
    /// USD.
    async fn parse(&self, path: &Path) -> Result<ParsedDocument>;
}

/// Resolve the API key for the configured provider.
fn resolve_api_key(config: &LlmConfig) -> Result<String> {
    let var = config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
    std::env::var(var)
        .map_err(|_| Error::Config(format!("API key environment variable {var} not set")))
}

/// Build the completer used for query classification (temperature 0).
pub fn classification_completer(config: &LlmConfig) -> Result<Arc<dyn Completer>> {
    let key = resolve_api_key(config)?;
    Ok(Arc::new(OpenAiCompleter::new(
        &config.base_url,
        &key,
        &config.classification_model,
        0.0,
    )))
}

/// Build the completer used for hypothetical-document generation.
pub fn hyde_completer(config: &LlmConfig) -> Result<Arc<dyn Completer>> {
    let key = resolve_api_key(config)?;
    Ok(Arc::new(OpenAiCompleter::new(
        &config.base_url,
        &key,
        &config.hyde_model,
        0.7,
    )))
}

/// Build the completer used for metadata extraction (temperature 0).
pub fn metadata_completer(config: &LlmConfig) -> Result<Arc<dyn Completer>> {
    let key = resolve_api_key(config)?;
    Ok(Arc::new(OpenAiCompleter::new(
        &config.base_url,
        &key,
        &config.metadata_model,
        0.0,
    )))
}

/// Build the completer used for markdown structure repair.
pub fn fixer_completer(config: &LlmConfig) -> Result<Arc<dyn Completer>> {
    let key = resolve_api_key(config)?;
    Ok(Arc::new(OpenAiCompleter::new(
        &config.base_url,
        &key,
        &config.fixer_model,
        0.0,
    )))
}

/// Build the embedder for the given model name.
pub fn embedder(config: &LlmConfig, model: &str) -> Result<Arc<dyn Embedder>> {
    let key = resolve_api_key(config)?;
    Ok(Arc::new(OpenAiEmbedder::new(&config.base_url, &key, model)))
}

/// Build the remote document parser.
pub fn document_parser(config: &LlmConfig) -> Result<Arc<dyn DocumentParser>> {
    let url = config
        .parser_url
        .as_deref()
        .ok_or_else(|| Error::Config("llm.parser_url is not configured".to_string()))?;
    Ok(Arc::new(HttpDocumentParser::new(url)))
}
