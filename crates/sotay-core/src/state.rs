//! Per-document pipeline state tracking.
//!
//! Each document carries a `.pipeline.json` sidecar recording which stages
//! ran, their input hashes, output artifacts, costs, and lock flags. The
//! sidecar is the source of truth for incremental execution: a stage is
//! skipped when its record is `completed`, unlocked, and its stored input
//! hash matches the current input.
//!
//! Concurrent writers to the same document are not supported; callers fan
//! out across documents, never within one.

use crate::storage::Storage;
use crate::types::Category;
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::warn;

/// Fixed vocabulary of processing-pipeline stages, in execution order.
pub const PROCESSING_STAGES: [&str; 6] = [
    "parse",
    "clean",
    "normalize",
    "filter",
    "fix-markdown",
    "metadata",
];

/// Fixed vocabulary of indexing-pipeline stages, in execution order.
pub const INDEXING_STAGES: [&str; 2] = ["chunk", "embed-index"];

/// Status of one stage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not started.
    Pending,
    /// Currently executing.
    InProgress,
    /// Finished; output artifact exists and input hash is recorded.
    Completed,
    /// Execute raised; metadata carries the error.
    Failed,
    /// Skipped by the incremental-execution check.
    Skipped,
    /// Content failed the quality gate.
    Rejected,
}

impl StageStatus {
    /// Short display symbol used in status summaries.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Pending => "[ ]",
            Self::InProgress => "[...]",
            Self::Completed => "[x]",
            Self::Failed => "[FAIL]",
            Self::Skipped => "[SKIP]",
            Self::Rejected => "[REJ]",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Record of one stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name from the fixed vocabulary.
    pub name: String,
    /// Current status.
    pub status: StageStatus,
    /// RFC 3339 timestamp of the last status transition.
    pub timestamp: String,
    /// 16-hex truncated SHA-256 of the stage input at run time.
    #[serde(default)]
    pub input_hash: Option<String>,
    /// Filename of the output artifact, when the stage produces one.
    #[serde(default)]
    pub output_file: Option<String>,
    /// Monetary cost in USD for the latest run.
    #[serde(default)]
    pub cost: f64,
    /// Lock flag: a manually edited artifact is never overwritten.
    #[serde(default)]
    pub manually_edited: bool,
    /// Free-form stage metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Compute the 16-hex truncated SHA-256 used for change detection.
#[must_use]
pub fn content_hash(content: &str) -> String {
    content_hash_bytes(content.as_bytes())
}

/// Byte-level variant of [`content_hash`], for binary stage inputs.
#[must_use]
pub fn content_hash_bytes(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// Pipeline state for a single document, persisted as `.pipeline.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Stable document id.
    pub document_id: String,
    /// Document category.
    pub category: Category,
    /// Original source file path, when known.
    #[serde(default)]
    pub source_file: Option<String>,
    /// Ordered stage records.
    #[serde(default)]
    pub stages: Vec<StageRecord>,
    /// Most recently completed stage.
    #[serde(default)]
    pub current_stage: Option<String>,
    /// Latest markdown output of the processing pipeline.
    #[serde(default)]
    pub final_output: Option<String>,
    /// Set when the state was converted from a pre-sidecar layout.
    #[serde(default)]
    pub migrated_from_legacy: bool,
    /// Free-form document metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl PipelineState {
    /// Create an empty state for a document.
    #[must_use]
    pub fn new(category: Category, document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            category,
            source_file: None,
            stages: Vec::new(),
            current_stage: None,
            final_output: None,
            migrated_from_legacy: false,
            metadata: Map::new(),
        }
    }

    /// Load state from the sidecar, or return an empty state.
    ///
    /// A missing or malformed sidecar is treated as empty state with a
    /// warning; it never aborts the pipeline.
    pub fn load(storage: &Storage, category: Category, document_id: &str) -> Result<Self> {
        let path = storage.state_path(category, document_id)?;
        if !path.exists() {
            return Ok(Self::new(category, document_id));
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Storage(format!("Failed to read state sidecar: {e}")))?;

        match serde_json::from_str::<Self>(&contents) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(
                    "Malformed state sidecar for {}/{} ({e}), treating as empty",
                    category.as_str(),
                    document_id
                );
                Ok(Self::new(category, document_id))
            },
        }
    }

    /// Persist state to the sidecar (atomic write).
    pub fn save(&self, storage: &Storage) -> Result<()> {
        storage.ensure_document_dir(self.category, &self.document_id)?;
        let path = storage.state_path(self.category, &self.document_id)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Storage(format!("Failed to serialize state: {e}")))?;
        crate::storage::write_atomic(&path, &json)
    }

    /// Get a stage record by name.
    #[must_use]
    pub fn get_stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }

    fn get_stage_mut(&mut self, name: &str) -> Option<&mut StageRecord> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    /// Add or update a stage record by name.
    ///
    /// Re-running a stage replaces the prior cost rather than accumulating
    /// it. On `completed`, `current_stage` follows, and `final_output`
    /// follows when the stage produced a markdown artifact.
    pub fn add_or_update_stage(
        &mut self,
        name: &str,
        status: StageStatus,
        output_file: Option<String>,
        input_hash: Option<String>,
        cost: f64,
        metadata: Option<Map<String, Value>>,
    ) {
        let timestamp = Utc::now().to_rfc3339();

        if let Some(existing) = self.get_stage_mut(name) {
            existing.status = status;
            existing.timestamp = timestamp;
            if output_file.is_some() {
                existing.output_file = output_file.clone();
            }
            if input_hash.is_some() {
                existing.input_hash = input_hash;
            }
            existing.cost = cost;
            if let Some(extra) = metadata {
                for (k, v) in extra {
                    existing.metadata.insert(k, v);
                }
            }
        } else {
            self.stages.push(StageRecord {
                name: name.to_string(),
                status,
                timestamp,
                input_hash,
                output_file: output_file.clone(),
                cost,
                manually_edited: false,
                metadata: metadata.unwrap_or_default(),
            });
        }

        if status == StageStatus::Completed {
            self.current_stage = Some(name.to_string());
            if let Some(file) = output_file {
                self.final_output = Some(file);
            }
        }
    }

    /// Check whether a stage is completed.
    #[must_use]
    pub fn is_completed(&self, name: &str) -> bool {
        self.get_stage(name)
            .is_some_and(|s| s.status == StageStatus::Completed)
    }

    /// Check whether a stage is locked against overwrite.
    #[must_use]
    pub fn is_locked(&self, name: &str) -> bool {
        self.get_stage(name).is_some_and(|s| s.manually_edited)
    }

    /// Lock a stage so future runs never overwrite its artifact.
    pub fn lock_stage(&mut self, name: &str) {
        if let Some(stage) = self.get_stage_mut(name) {
            stage.manually_edited = true;
        }
    }

    /// Remove the lock from a stage.
    pub fn unlock_stage(&mut self, name: &str) {
        if let Some(stage) = self.get_stage_mut(name) {
            stage.manually_edited = false;
        }
    }

    /// Check if a stage needs to rerun for the given input content.
    ///
    /// True when the record is absent, not completed, or (not locked and the
    /// stored hash differs from the current input's hash).
    #[must_use]
    pub fn needs_rerun(&self, name: &str, input_content: &str) -> bool {
        self.needs_rerun_hash(name, &content_hash(input_content))
    }

    /// Hash-level variant of [`Self::needs_rerun`] for callers that already
    /// computed the input hash (or hashed binary input).
    #[must_use]
    pub fn needs_rerun_hash(&self, name: &str, current_hash: &str) -> bool {
        let Some(stage) = self.get_stage(name) else {
            return true;
        };

        if stage.status != StageStatus::Completed {
            return true;
        }

        if stage.manually_edited {
            return false;
        }

        match &stage.input_hash {
            Some(stored) => stored != current_hash,
            None => false,
        }
    }

    /// Total cost across all stage records.
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.stages.iter().map(|s| s.cost).sum()
    }

    /// Human-readable summary over the full stage vocabulary.
    ///
    /// Example: `[x] parse -> [x] clean -> [FAIL] fix-markdown`.
    #[must_use]
    pub fn status_summary(&self) -> String {
        PROCESSING_STAGES
            .iter()
            .chain(INDEXING_STAGES.iter())
            .map(|name| {
                let symbol = self
                    .get_stage(name)
                    .map_or("[ ]", |s| s.status.symbol());
                format!("{symbol} {name}")
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
