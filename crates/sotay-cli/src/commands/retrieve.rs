//! `sotay retrieve` - ad-hoc retrieval through router and engine.

use crate::services;
use anyhow::{Context, Result};
use colored::Colorize;
use sotay_core::types::Category;
use std::str::FromStr;

pub async fn execute(
    config: &sotay_core::Config,
    query: &str,
    collection: Option<&str>,
    json: bool,
) -> Result<()> {
    let retriever = services::retriever(config).await?;

    let collections: Vec<Category> = match collection {
        Some(name) => vec![Category::from_str(name).context("unrecognized category")?],
        None => {
            let router = services::router(config)?;
            let decision = router.route(query).await;
            println!(
                "{} {:?} ({})",
                "Routing:".bold(),
                decision.collections,
                decision.strategy
            );
            decision
                .collections
                .iter()
                .filter_map(|c| Category::from_str(c).ok())
                .collect()
        },
    };

    for category in collections {
        let result = retriever.retrieve(query, category).await?;
        println!(
            "\n{} [{}] {} candidates, {} final (reranked: {})",
            "Results".bold().green(),
            category.as_str(),
            result.total_retrieved,
            result.final_count,
            result.reranked
        );

        if json {
            let value = match category {
                Category::Regulation => {
                    serde_json::to_value(retriever.retrieve_regulation(query).await?)?
                },
                Category::Curriculum => {
                    serde_json::to_value(retriever.retrieve_curriculum(query).await?)?
                },
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
            continue;
        }

        for (i, node) in result.nodes.iter().enumerate() {
            println!(
                "\n{} (score {:.3}, doc {})",
                format!("#{}", i + 1).bold(),
                node.score,
                node.document_id.cyan()
            );
            let preview: String = node.text.chars().take(400).collect();
            println!("{preview}");
        }
    }

    Ok(())
}
