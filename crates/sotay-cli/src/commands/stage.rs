//! `sotay stage` - lock, unlock, or rerun a single stage.

use crate::services;
use anyhow::{Context, Result, bail};
use colored::Colorize;
use sotay_core::llm;
use sotay_core::pipeline::{IndexingPipeline, ProcessingPipeline};
use sotay_core::state::{INDEXING_STAGES, PROCESSING_STAGES, PipelineState};
use sotay_core::types::Category;
use sotay_core::VectorStore;
use std::path::PathBuf;
use std::str::FromStr;

pub fn lock(
    config: &sotay_core::Config,
    category: &str,
    document_id: &str,
    stage: &str,
    lock: bool,
) -> Result<()> {
    let category = Category::from_str(category).context("unrecognized category")?;
    let storage = services::storage(config);

    let mut state = PipelineState::load(&storage, category, document_id)?;
    if state.get_stage(stage).is_none() {
        bail!("no record for stage '{stage}' on {}/{document_id}", category.as_str());
    }

    if lock {
        state.lock_stage(stage);
        println!("{} {stage} (manual edits protected)", "Locked".bold().green());
    } else {
        state.unlock_stage(stage);
        println!("{} {stage}", "Unlocked".bold().green());
    }
    state.save(&storage)?;
    Ok(())
}

pub async fn rerun(
    config: &sotay_core::Config,
    category: &str,
    document_id: &str,
    stage: &str,
    force: bool,
) -> Result<()> {
    let category = Category::from_str(category).context("unrecognized category")?;
    let storage = services::storage(config);

    let result = if PROCESSING_STAGES.contains(&stage) {
        let state = PipelineState::load(&storage, category, document_id)?;
        let source = state
            .source_file
            .clone()
            .map(PathBuf::from)
            .unwrap_or_default();

        let mut pipeline = ProcessingPipeline::new(
            storage,
            category,
            document_id,
            source,
            services::processing_services(config, category)?,
        )?;
        pipeline.run_stage(stage, force).await?
    } else if INDEXING_STAGES.contains(&stage) {
        let store = VectorStore::open(&config.paths.vector_store_path).await?;
        let embedder = llm::embedder(&config.llm, &config.indexing.embed_model)?;

        let mut pipeline = IndexingPipeline::new(
            storage,
            category,
            document_id,
            services::splitter_config(config),
            embedder,
            store,
            config.indexing.embed_unit_price,
        )?;
        pipeline.run_stage(stage, force).await?
    } else {
        bail!("unknown stage '{stage}'");
    };

    if result.executed {
        println!(
            "{} {stage} (cost {})",
            "Executed".bold().green(),
            format!("${:.4}", result.cost).yellow()
        );
    } else {
        println!(
            "{} {stage}: {}",
            "Skipped".bold().yellow(),
            result.skip_reason.unwrap_or_default()
        );
    }
    Ok(())
}
