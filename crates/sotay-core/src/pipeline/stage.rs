//! Stage contract and runner.
//!
//! A stage is one unit of the pipeline: it reads an input file, produces an
//! output artifact (or indexes side effects), and records its run in the
//! document's state sidecar. The runner wraps every execution with the
//! skip-check / validate / in-progress / complete-or-fail protocol so the
//! stages themselves stay small.

use crate::state::{PipelineState, StageStatus, content_hash_bytes};
use crate::storage::Storage;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::path::Path;
use tracing::{info, warn};

/// Why a stage was skipped (or why the skip-check let it run).
pub mod skip_reason {
    /// `--force` was set.
    pub const FORCE_FLAG: &str = "force_flag";
    /// No completed record exists yet.
    pub const NOT_COMPLETED: &str = "not_completed";
    /// The stage artifact is manually edited; never overwritten.
    pub const LOCKED_MANUAL_EDIT: &str = "locked_manual_edit";
    /// The stored input hash no longer matches.
    pub const INPUT_CHANGED: &str = "input_changed";
    /// Completed with a matching input hash.
    pub const ALREADY_COMPLETED: &str = "already_completed";
    /// The stage opts out of skipping entirely.
    pub const ALWAYS_RERUN: &str = "always_rerun";
}

/// Outcome of driving one stage.
#[derive(Debug, Clone)]
pub struct StageRunResult {
    /// True when the stage's execute step ran.
    pub executed: bool,
    /// True when the incremental check skipped the stage.
    pub skipped: bool,
    /// Skip reason when `skipped` is true.
    pub skip_reason: Option<String>,
    /// Cost of this run in USD.
    pub cost: f64,
    /// Stage metadata recorded in the sidecar.
    pub metadata: Map<String, Value>,
}

impl StageRunResult {
    fn skipped(reason: &str) -> Self {
        Self {
            executed: false,
            skipped: true,
            skip_reason: Some(reason.to_string()),
            cost: 0.0,
            metadata: Map::new(),
        }
    }
}

/// Contract for a pipeline unit.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name from the fixed vocabulary.
    fn name(&self) -> &'static str;

    /// True when the stage spends money (API calls).
    fn is_costly(&self) -> bool {
        false
    }

    /// True when rerunning is safe.
    fn is_idempotent(&self) -> bool {
        true
    }

    /// Human-readable description.
    fn description(&self) -> &'static str;

    /// Output artifact filename; `None` for stages whose output is not a
    /// markdown artifact (chunk, embed-index).
    fn output_filename(&self) -> Option<&'static str>;

    /// True when the skip-check is bypassed entirely (chunk stage).
    fn always_runs(&self) -> bool {
        false
    }

    /// Core processing. Returns extra metadata for the stage record; a
    /// `cost` key (f64) is picked up as the run's cost.
    async fn execute(
        &self,
        input_path: &Path,
        output_path: Option<&Path>,
        state: &mut PipelineState,
        storage: &Storage,
    ) -> Result<Map<String, Value>>;
}

/// Decide whether a stage should be skipped for the current input.
fn should_skip(
    stage: &dyn Stage,
    state: &PipelineState,
    input_path: &Path,
    force: bool,
) -> (bool, &'static str) {
    if stage.always_runs() {
        return (false, skip_reason::ALWAYS_RERUN);
    }
    // A manually edited artifact is never overwritten, not even by --force;
    // the lock must be removed explicitly first.
    if state.is_locked(stage.name()) {
        return (true, skip_reason::LOCKED_MANUAL_EDIT);
    }
    if force {
        return (false, skip_reason::FORCE_FLAG);
    }
    if !state.is_completed(stage.name()) {
        return (false, skip_reason::NOT_COMPLETED);
    }
    if let Ok(bytes) = std::fs::read(input_path) {
        if state.needs_rerun_hash(stage.name(), &content_hash_bytes(&bytes)) {
            return (false, skip_reason::INPUT_CHANGED);
        }
    }
    (true, skip_reason::ALREADY_COMPLETED)
}

/// Drive one stage with full state management.
pub async fn run_stage(
    stage: &dyn Stage,
    storage: &Storage,
    state: &mut PipelineState,
    input_path: &Path,
    force: bool,
) -> Result<StageRunResult> {
    let name = stage.name();

    let (skip, reason) = should_skip(stage, state, input_path, force);
    if skip {
        info!("[SKIP] {name}: {reason}");
        return Ok(StageRunResult::skipped(reason));
    }

    if stage.is_costly() && force && state.is_completed(name) {
        warn!("Re-running costly stage '{name}' because of --force");
    }

    // Validate input.
    if !input_path.exists() {
        return Err(Error::Input(format!(
            "Input file not found: {}",
            input_path.display()
        )));
    }
    let input_bytes = std::fs::read(input_path)
        .map_err(|e| Error::Input(format!("Failed to read {}: {e}", input_path.display())))?;
    if input_bytes.is_empty() {
        return Err(Error::Input(format!(
            "Input file is empty: {}",
            input_path.display()
        )));
    }
    let input_hash = content_hash_bytes(&input_bytes);
    drop(input_bytes);

    state.add_or_update_stage(name, StageStatus::InProgress, None, None, 0.0, None);
    state.save(storage)?;

    let output_path = match stage.output_filename() {
        Some(filename) => Some(storage.artifact_path(state.category, &state.document_id, filename)?),
        None => None,
    };

    info!("[{}] Processing...", name.to_uppercase());
    match stage
        .execute(input_path, output_path.as_deref(), &mut *state, storage)
        .await
    {
        Ok(metadata) => {
            let cost = metadata.get("cost").and_then(Value::as_f64).unwrap_or(0.0);
            state.add_or_update_stage(
                name,
                StageStatus::Completed,
                stage.output_filename().map(String::from),
                Some(input_hash),
                cost,
                Some(metadata.clone()),
            );
            state.save(storage)?;
            info!(
                "[{}] Completed{}",
                name.to_uppercase(),
                stage
                    .output_filename()
                    .map(|f| format!(" -> {f}"))
                    .unwrap_or_default()
            );
            Ok(StageRunResult {
                executed: true,
                skipped: false,
                skip_reason: None,
                cost,
                metadata,
            })
        },
        Err(err) => {
            // Quality rejections already transitioned the record to
            // `rejected` inside the stage; a `failed` overwrite here would
            // lose that.
            if !matches!(err, Error::QualityRejection { .. }) {
                let mut meta = Map::new();
                meta.insert("error".to_string(), json!(err.to_string()));
                state.add_or_update_stage(name, StageStatus::Failed, None, None, 0.0, Some(meta));
                state.save(storage)?;
            }
            warn!("[{}] Failed: {err}", name.to_uppercase());
            Err(err)
        },
    }
}
