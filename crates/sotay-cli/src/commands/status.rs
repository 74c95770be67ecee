//! `sotay status` - per-document stage summaries and running cost.

use crate::services;
use anyhow::{Context, Result};
use colored::Colorize;
use sotay_core::state::PipelineState;
use sotay_core::types::Category;
use std::str::FromStr;

pub fn execute(
    config: &sotay_core::Config,
    category: Option<&str>,
    document_id: Option<&str>,
) -> Result<()> {
    let storage = services::storage(config);

    let categories: Vec<Category> = match category {
        Some(name) => vec![Category::from_str(name).context("unrecognized category")?],
        None => Category::all().to_vec(),
    };

    let mut grand_total = 0.0_f64;
    for category in categories {
        let documents = match document_id {
            Some(id) => vec![id.to_string()],
            None => storage.list_documents(category)?,
        };
        if documents.is_empty() {
            continue;
        }

        println!("{}", category.as_str().bold().underline());
        for document in documents {
            let state = PipelineState::load(&storage, category, &document)?;
            let cost = state.total_cost();
            grand_total += cost;

            println!(
                "  {}  {}  {}",
                document.cyan(),
                state.status_summary(),
                format!("${cost:.4}").yellow()
            );
        }
        println!();
    }

    println!("{} {}", "Total cost:".bold(), format!("${grand_total:.4}").yellow());
    Ok(())
}
