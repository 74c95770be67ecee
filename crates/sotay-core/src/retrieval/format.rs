//! Node-to-structured-document formatting.

use super::schemas::{
    CurriculumDocument, CurriculumRetrievalResult, RegulationDocument, RegulationRetrievalResult,
    validate_score,
};
use crate::Result;
use crate::chunker::CONTEXT_SEPARATOR;
use crate::types::ScoredNode;

/// Strip the prepended context header from chunk content.
///
/// Everything up to the first `\n---\n` separator is context; without a
/// separator the content passes through unchanged.
#[must_use]
pub fn strip_context_header(content: &str) -> &str {
    content
        .split_once(CONTEXT_SEPARATOR)
        .map_or(content, |(_, body)| body.trim())
}

/// Formatter for retrieval results.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultFormatter;

impl ResultFormatter {
    /// Build a structured regulation result from scored nodes.
    pub fn format_regulation(
        query: &str,
        nodes: &[ScoredNode],
    ) -> Result<RegulationRetrievalResult> {
        let mut documents = Vec::with_capacity(nodes.len());
        for node in nodes {
            documents.push(RegulationDocument {
                content: strip_context_header(&node.text).to_string(),
                title: node.meta_str("title").unwrap_or_default().to_string(),
                regulation_number: node.meta_str("regulation_number").map(String::from),
                hierarchy: node.meta_str("hierarchy").unwrap_or_default().to_string(),
                effective_date: node.meta_str("effective_date").map(String::from),
                document_type: node
                    .meta_str("document_type")
                    .unwrap_or("original")
                    .to_string(),
                year: node.meta_i64("year"),
                pdf_file: node
                    .meta_str("pdf_file")
                    .or_else(|| node.meta_str("source_file"))
                    .map(String::from),
                score: validate_score(node.score)?,
            });
        }

        Ok(RegulationRetrievalResult {
            query: query.to_string(),
            total_retrieved: documents.len(),
            documents,
        })
    }

    /// Build a structured curriculum result from scored nodes.
    pub fn format_curriculum(
        query: &str,
        nodes: &[ScoredNode],
    ) -> Result<CurriculumRetrievalResult> {
        let mut documents = Vec::with_capacity(nodes.len());
        for node in nodes {
            documents.push(CurriculumDocument {
                content: strip_context_header(&node.text).to_string(),
                title: node.meta_str("title").unwrap_or_default().to_string(),
                year: node.meta_i64("year"),
                major: node.meta_str("major").map(String::from),
                major_code: node.meta_str("major_code").map(String::from),
                program_type: node.meta_str("program_type").map(String::from),
                program_name: node.meta_str("program_name").map(String::from),
                source_url: node.meta_str("source_url").map(String::from),
                score: validate_score(node.score)?,
            });
        }

        Ok(CurriculumRetrievalResult {
            query: query.to_string(),
            total_retrieved: documents.len(),
            documents,
        })
    }
}
