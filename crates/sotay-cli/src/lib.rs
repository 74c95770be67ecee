//! sotay CLI
//!
//! Dispatches subcommands over the sotay-core pipeline and retrieval engine.

mod cli;
mod commands;
mod services;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, StageAction};
use sotay_core::Config;

/// Parse arguments and run the selected command.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Process {
            file,
            category,
            document_id,
            force,
        } => commands::process::execute(&config, &file, &category, document_id, force).await,
        Commands::Index {
            document_id,
            category,
            force,
        } => commands::index::execute(&config, &document_id, &category, force).await,
        Commands::Pipeline {
            file,
            category,
            document_id,
            force,
        } => commands::pipeline::execute(&config, &file, &category, document_id, force).await,
        Commands::Status {
            category,
            document_id,
        } => commands::status::execute(&config, category.as_deref(), document_id.as_deref()),
        Commands::Stage { action } => match action {
            StageAction::Lock {
                category,
                document_id,
                stage,
            } => commands::stage::lock(&config, &category, &document_id, &stage, true),
            StageAction::Unlock {
                category,
                document_id,
                stage,
            } => commands::stage::lock(&config, &category, &document_id, &stage, false),
            StageAction::Rerun {
                category,
                document_id,
                stage,
                force,
            } => commands::stage::rerun(&config, &category, &document_id, &stage, force).await,
        },
        Commands::Retrieve {
            query,
            collection,
            json,
        } => commands::retrieve::execute(&config, &query, collection.as_deref(), json).await,
    }
}
