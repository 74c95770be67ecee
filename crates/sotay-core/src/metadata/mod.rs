//! Category-specific structured metadata extraction.
//!
//! A small factory keyed by category produces a generator that reads the
//! processed markdown, calls a category-specific prompt at temperature 0,
//! and returns a validated typed record. Filename-derived facts (regulation
//! code, effective date) take priority over LLM output where the filename is
//! authoritative.

pub mod codes;
mod curriculum;
mod regulation;

pub use codes::RegulationCodes;
pub use curriculum::CurriculumMetadataGenerator;
pub use regulation::RegulationMetadataGenerator;

use crate::llm::Completer;
use crate::types::Category;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Regulation document type.
///
/// `replacement` is accepted for forward compatibility; the generator itself
/// emits only `original` and `update` (folding `supplement` into `update`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// A newly issued regulation.
    Original,
    /// An amendment to an earlier regulation.
    Update,
    /// A full replacement of an earlier regulation.
    Replacement,
}

/// Training program type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramType {
    /// Full-time on-campus program.
    #[serde(rename = "Chính quy")]
    ChinhQuy,
    /// Distance-learning program.
    #[serde(rename = "Từ xa")]
    TuXa,
}

/// Typed metadata for a regulation document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulationMetadata {
    /// Document title.
    pub title: String,
    /// Issue year.
    pub year: Option<i32>,
    /// Short summary of the document.
    pub summary: String,
    /// Topic keywords.
    pub keywords: Vec<String>,
    /// Original or update.
    pub document_type: DocumentType,
    /// ISO effective date (`2022-09-28`).
    pub effective_date: Option<String>,
    /// True when the document is a listing page rather than a regulation.
    pub is_index_page: bool,
    /// Canonical code of the base regulation this document belongs to.
    pub base_regulation_code: Option<String>,
    /// Bare decision number (`828`).
    pub regulation_number: Option<String>,
}

/// Typed metadata for a curriculum document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumMetadata {
    /// Document title.
    pub title: String,
    /// Cohort year.
    pub year: Option<i32>,
    /// Short summary of the document.
    pub summary: String,
    /// Topic keywords.
    pub keywords: Vec<String>,
    /// Major name from the closed vocabulary.
    pub major: Option<String>,
    /// Ministry major code (`7480101`).
    pub major_code: Option<String>,
    /// Program type.
    pub program_type: Option<ProgramType>,
    /// Specific program name from the closed vocabulary.
    pub program_name: Option<String>,
    /// True when the document is a listing page.
    pub is_index_page: bool,
}

/// Generator contract: processed markdown in, validated JSON metadata out.
#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    /// Extract metadata for a document.
    ///
    /// `filename` is the original source filename (used for code and date
    /// extraction); `content` is the processed markdown.
    async fn generate(&self, filename: &str, content: &str) -> Result<serde_json::Value>;
}

/// Build the generator for a category.
pub fn generator_for(
    category: Category,
    completer: Arc<dyn Completer>,
    codes: Arc<Mutex<RegulationCodes>>,
) -> Arc<dyn MetadataGenerator> {
    match category {
        Category::Regulation => Arc::new(RegulationMetadataGenerator::new(completer, codes)),
        Category::Curriculum => Arc::new(CurriculumMetadataGenerator::new(completer)),
    }
}

/// Strip an optional ```json fence from an LLM response and parse it.
pub(crate) fn parse_json_response(response: &str) -> Result<serde_json::Value> {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    serde_json::from_str(text.trim())
        .map_err(|e| Error::Remote(format!("metadata response is not valid JSON: {e}")))
}

/// Truncate content to a character budget for prompt inclusion.
pub(crate) fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_response_with_fence() {
        let value = parse_json_response("```json\n{\"title\": \"Quy chế\"}\n```").unwrap();
        assert_eq!(value["title"], "Quy chế");
    }

    #[test]
    fn test_parse_json_response_plain() {
        let value = parse_json_response("{\"year\": 2022}").unwrap();
        assert_eq!(value["year"], 2022);
    }

    #[test]
    fn test_parse_json_response_garbage_is_error() {
        assert!(parse_json_response("không phải json").is_err());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        let text = "Trường Đại học";
        assert_eq!(truncate_chars(text, 6), "Trường");
        assert_eq!(truncate_chars(text, 1000), text);
    }

    #[test]
    fn test_document_type_serde() {
        assert_eq!(
            serde_json::to_string(&DocumentType::Original).unwrap(),
            "\"original\""
        );
        let parsed: DocumentType = serde_json::from_str("\"replacement\"").unwrap();
        assert_eq!(parsed, DocumentType::Replacement);
    }

    #[test]
    fn test_program_type_serde_vietnamese_labels() {
        assert_eq!(
            serde_json::to_string(&ProgramType::ChinhQuy).unwrap(),
            "\"Chính quy\""
        );
        let parsed: ProgramType = serde_json::from_str("\"Từ xa\"").unwrap();
        assert_eq!(parsed, ProgramType::TuXa);
    }
}
