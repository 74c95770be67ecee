//! Structured retrieval result schemas.
//!
//! These records are the tool-facing output format: clean content with
//! separated metadata fields, scores rounded to two decimals and validated
//! into [0, 1].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Round a score to two decimals and clamp-validate it into [0, 1].
pub(crate) fn validate_score(score: f32) -> Result<f32> {
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(Error::Other(format!(
            "score {score} outside the [0, 1] range"
        )));
    }
    Ok((score * 100.0).round() / 100.0)
}

/// A structured chunk from a regulation document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulationDocument {
    /// Chunk content with the context header stripped.
    pub content: String,
    /// Document title.
    pub title: String,
    /// Decision number (`790`, `560`).
    pub regulation_number: Option<String>,
    /// Hierarchy path (`CHƯƠNG 5 > Điều 33 > Khoản 1`).
    pub hierarchy: String,
    /// ISO effective date.
    pub effective_date: Option<String>,
    /// `original`, `update`, or `replacement`.
    pub document_type: String,
    /// Issue year.
    pub year: Option<i64>,
    /// Original PDF filename.
    pub pdf_file: Option<String>,
    /// Reranker score in [0, 1], two decimals.
    pub score: f32,
}

/// A structured chunk from a curriculum document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumDocument {
    /// Chunk content with the context header stripped.
    pub content: String,
    /// Document title.
    pub title: String,
    /// Cohort year.
    pub year: Option<i64>,
    /// Major name.
    pub major: Option<String>,
    /// Ministry major code.
    pub major_code: Option<String>,
    /// `Chính quy` or `Từ xa`.
    pub program_type: Option<String>,
    /// Specific program name.
    pub program_name: Option<String>,
    /// Source URL of the document.
    pub source_url: Option<String>,
    /// Reranker score in [0, 1], two decimals.
    pub score: f32,
}

/// Result of `retrieve_regulation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulationRetrievalResult {
    /// Original user query.
    pub query: String,
    /// Number of documents returned.
    pub total_retrieved: usize,
    /// Structured regulation documents, best first.
    pub documents: Vec<RegulationDocument>,
}

/// Result of `retrieve_curriculum`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumRetrievalResult {
    /// Original user query.
    pub query: String,
    /// Number of documents returned.
    pub total_retrieved: usize,
    /// Structured curriculum documents, best first.
    pub documents: Vec<CurriculumDocument>,
}
