//! `sotay index` - run the indexing pipeline on a processed document.

use crate::services;
use anyhow::{Context, Result};
use colored::Colorize;
use sotay_core::VectorStore;
use sotay_core::llm;
use sotay_core::pipeline::IndexingPipeline;
use sotay_core::types::Category;
use std::str::FromStr;

pub async fn execute(
    config: &sotay_core::Config,
    document_id: &str,
    category: &str,
    force: bool,
) -> Result<()> {
    let category = Category::from_str(category).context("unrecognized category")?;

    println!(
        "{} {}/{}",
        "Indexing".bold().green(),
        category.as_str(),
        document_id
    );

    let store = VectorStore::open(&config.paths.vector_store_path).await?;
    let embedder = llm::embedder(&config.llm, &config.indexing.embed_model)?;

    let mut pipeline = IndexingPipeline::new(
        services::storage(config),
        category,
        document_id,
        services::splitter_config(config),
        embedder,
        store,
        config.indexing.embed_unit_price,
    )?;

    let summary = pipeline.run(force).await?;

    println!(
        "{} {} run, {} skipped, cost {}",
        "Done:".bold(),
        summary.stages_run.len(),
        summary.stages_skipped.len(),
        format!("${:.4}", summary.total_cost).yellow()
    );
    Ok(())
}
