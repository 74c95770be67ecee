//! `sotay process` - run the processing pipeline on a source file.

use crate::services;
use anyhow::{Context, Result, bail};
use colored::Colorize;
use sotay_core::Storage;
use sotay_core::pipeline::ProcessingPipeline;
use sotay_core::types::Category;
use std::path::Path;
use std::str::FromStr;

pub async fn execute(
    config: &sotay_core::Config,
    file: &Path,
    category: &str,
    document_id: Option<String>,
    force: bool,
) -> Result<()> {
    let category = Category::from_str(category).context("unrecognized category")?;

    if !file.exists() {
        bail!("source file not found: {}", file.display());
    }

    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("source file has no usable name")?;
    let document_id = document_id.unwrap_or_else(|| Storage::document_id_from_filename(filename));

    println!(
        "{} {}/{}",
        "Processing".bold().green(),
        category.as_str(),
        document_id
    );

    let mut pipeline = ProcessingPipeline::new(
        services::storage(config),
        category,
        &document_id,
        file.to_path_buf(),
        services::processing_services(config, category)?,
    )?;

    let summary = pipeline.run(force).await?;

    println!();
    println!("{}", pipeline.state().status_summary());
    println!(
        "{} {} run, {} skipped, cost {}",
        "Done:".bold(),
        summary.stages_run.len(),
        summary.stages_skipped.len(),
        format!("${:.4}", summary.total_cost).yellow()
    );
    Ok(())
}
