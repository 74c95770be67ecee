//! CLI structure and argument parsing.
//!
//! ```bash
//! # Process a raw document into clean markdown + metadata
//! sotay process data/raw/790-qd-dhcntt_quy_che.pdf --category regulation
//!
//! # Chunk and index a processed document
//! sotay index 790-qd-dhcntt_quy_che --category regulation
//!
//! # Full pipeline in one shot
//! sotay pipeline data/raw/790-qd-dhcntt_quy_che.pdf --category regulation
//!
//! # Per-document status and costs
//! sotay status --category regulation
//!
//! # Lock a hand-edited artifact against overwrite
//! sotay stage lock regulation 790-qd-dhcntt_quy_che fix-markdown
//!
//! # Ad-hoc retrieval
//! sotay retrieve "điều kiện tốt nghiệp"
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI for the sotay knowledge pipeline.
#[derive(Parser, Debug)]
#[command(name = "sotay")]
#[command(version)]
#[command(about = "sotay - knowledge pipeline and retrieval for university documents", long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging output.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Path to an explicit config file (overrides discovery).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the processing pipeline (parse → … → metadata) on a source file.
    Process {
        /// Source document (PDF/DOCX/XLSX).
        file: PathBuf,

        /// Document category.
        #[arg(long, value_name = "CATEGORY")]
        category: String,

        /// Override the derived document id.
        #[arg(long, value_name = "ID")]
        document_id: Option<String>,

        /// Rerun stages even when completed.
        #[arg(long)]
        force: bool,
    },

    /// Run the indexing pipeline (chunk → embed-index) on a processed document.
    Index {
        /// Document id under the stages root.
        document_id: String,

        /// Document category.
        #[arg(long, value_name = "CATEGORY")]
        category: String,

        /// Rerun stages even when completed.
        #[arg(long)]
        force: bool,
    },

    /// Run processing then indexing for a source file.
    Pipeline {
        /// Source document (PDF/DOCX/XLSX).
        file: PathBuf,

        /// Document category.
        #[arg(long, value_name = "CATEGORY")]
        category: String,

        /// Override the derived document id.
        #[arg(long, value_name = "ID")]
        document_id: Option<String>,

        /// Rerun stages even when completed.
        #[arg(long)]
        force: bool,
    },

    /// Show pipeline status and cost per document.
    Status {
        /// Limit output to one category.
        #[arg(long, value_name = "CATEGORY")]
        category: Option<String>,

        /// Limit output to one document.
        document_id: Option<String>,
    },

    /// Manage one stage record of a document.
    Stage {
        /// Operation to perform.
        #[command(subcommand)]
        action: StageAction,
    },

    /// Run an ad-hoc retrieval query through router and engine.
    Retrieve {
        /// The query text.
        query: String,

        /// Skip routing and query one collection directly.
        #[arg(long, value_name = "CATEGORY")]
        collection: Option<String>,

        /// Print the structured JSON result instead of text.
        #[arg(long)]
        json: bool,
    },
}

/// Stage management operations.
#[derive(Subcommand, Debug)]
pub enum StageAction {
    /// Lock a stage so pipeline runs never overwrite its artifact.
    Lock {
        /// Document category.
        category: String,
        /// Document id.
        document_id: String,
        /// Stage name.
        stage: String,
    },

    /// Remove the lock from a stage.
    Unlock {
        /// Document category.
        category: String,
        /// Document id.
        document_id: String,
        /// Stage name.
        stage: String,
    },

    /// Rerun a single stage.
    Rerun {
        /// Document category.
        category: String,
        /// Document id.
        document_id: String,
        /// Stage name.
        stage: String,

        /// Rerun even when completed with a matching hash.
        #[arg(long)]
        force: bool,
    },
}
