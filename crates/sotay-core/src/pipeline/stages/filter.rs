//! Filter stage: quality gate over processed content.
//!
//! Applies hard rules (too short, error pages, navigation pages) and a
//! heuristic score over word count, paragraph count, and information
//! density. Rejected content is copied to the rejected area with a stats
//! sibling, the stage record flips to `rejected`, and the pipeline aborts
//! for this document.

use crate::pipeline::stage::Stage;
use crate::state::{PipelineState, StageStatus};
use crate::storage::Storage;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::path::Path;

const MIN_WORD_COUNT: usize = 30;
const SCORE_THRESHOLD: f64 = 0.3;
const LINK_DENSITY_LIMIT: f64 = 0.7;

const ERROR_PAGE_MARKERS: [&str; 5] = [
    "404",
    "Page not found",
    "Không tìm thấy trang",
    "Access denied",
    "Forbidden",
];

/// Content statistics used by the quality gate.
#[derive(Debug, Clone, Copy)]
pub struct ContentStats {
    /// Whitespace-separated words.
    pub word_count: usize,
    /// Blank-line separated paragraphs with content.
    pub paragraph_count: usize,
    /// Heuristic quality score in [0, 1].
    pub score: f64,
}

/// Rule-based content quality filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFilter;

impl ContentFilter {
    /// Compute statistics for a document.
    #[must_use]
    pub fn stats(content: &str) -> ContentStats {
        let words: Vec<&str> = content.split_whitespace().collect();
        let word_count = words.len();

        let paragraph_count = content
            .split("\n\n")
            .filter(|p| !p.trim().is_empty())
            .count();

        let unique_words: HashSet<String> =
            words.iter().map(|w| w.to_lowercase()).collect();
        let density = if word_count == 0 {
            0.0
        } else {
            unique_words.len() as f64 / word_count as f64
        };

        #[allow(clippy::cast_precision_loss)]
        let score = 0.4 * (word_count as f64 / 300.0).min(1.0)
            + 0.3 * (paragraph_count as f64 / 10.0).min(1.0)
            + 0.3 * density;

        ContentStats {
            word_count,
            paragraph_count,
            score,
        }
    }

    /// Decide whether content is useful. Returns `Err(reason)` on rejection.
    pub fn evaluate(content: &str) -> std::result::Result<ContentStats, (String, ContentStats)> {
        let stats = Self::stats(content);

        if stats.word_count < MIN_WORD_COUNT {
            return Err(("too_short".to_string(), stats));
        }

        for marker in ERROR_PAGE_MARKERS {
            if content.contains(marker) && stats.word_count < 100 {
                return Err(("error_page".to_string(), stats));
            }
        }

        let link_lines = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter(|l| l.contains("](http") || l.trim_start().starts_with("- ["))
            .count();
        let content_lines = content.lines().filter(|l| !l.trim().is_empty()).count();
        #[allow(clippy::cast_precision_loss)]
        if content_lines > 0
            && stats.word_count < 200
            && link_lines as f64 / content_lines as f64 > LINK_DENSITY_LIMIT
        {
            return Err(("navigation_page".to_string(), stats));
        }

        if stats.score < SCORE_THRESHOLD {
            return Err(("low_quality_score".to_string(), stats));
        }

        Ok(stats)
    }
}

/// Quality gate producing `04-filtered.md`, or a rejection. Non-costly.
pub struct FilterStage;

#[async_trait]
impl Stage for FilterStage {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn description(&self) -> &'static str {
        "Quality check - filter low-quality content"
    }

    fn output_filename(&self) -> Option<&'static str> {
        Some("04-filtered.md")
    }

    async fn execute(
        &self,
        input_path: &Path,
        output_path: Option<&Path>,
        state: &mut PipelineState,
        storage: &Storage,
    ) -> Result<Map<String, Value>> {
        let content = std::fs::read_to_string(input_path)?;

        match ContentFilter::evaluate(&content) {
            Ok(stats) => {
                if let Some(path) = output_path {
                    crate::storage::write_atomic(path, &content)?;
                }

                let mut metadata = Map::new();
                metadata.insert("passed".to_string(), json!(true));
                metadata.insert("score".to_string(), json!(stats.score));
                metadata.insert("word_count".to_string(), json!(stats.word_count));
                Ok(metadata)
            },
            Err((reason, stats)) => {
                let stats_json = json!({
                    "reason": reason,
                    "score": stats.score,
                    "word_count": stats.word_count,
                });
                let rejected_path = storage.write_rejected(
                    state.category,
                    &state.document_id,
                    &content,
                    &stats_json,
                )?;

                // The record flips to `rejected` here; the runner preserves
                // it instead of overwriting with `failed`.
                let mut meta = Map::new();
                meta.insert("reason".to_string(), json!(reason));
                meta.insert(
                    "rejected_to".to_string(),
                    json!(rejected_path.display().to_string()),
                );
                state.add_or_update_stage(
                    "filter",
                    StageStatus::Rejected,
                    None,
                    None,
                    0.0,
                    Some(meta),
                );
                state.save(storage)?;

                Err(Error::QualityRejection { reason })
            },
        }
    }
}
