//! Tool implementations and parameter schemas.

use crate::error::McpResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sotay_core::types::Category;
use sotay_core::{Retriever, Router, ScoredNode};
use std::str::FromStr;
use tracing::debug;

/// Parameters for the retrieval tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RetrieveParams {
    /// Search query, in Vietnamese or English.
    pub query: String,
}

/// Parameters for the portal tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PortalParams {
    /// Authenticated portal session cookie.
    pub cookie: String,
}

/// `retrieve_documents`: route the query, retrieve from every selected
/// collection, and render a human-readable block for agent consumption.
pub async fn retrieve_documents(
    retriever: &Retriever,
    router: &Router,
    query: &str,
) -> McpResult<String> {
    let decision = router.route(query).await;
    debug!(
        "Routed to {:?} via {}",
        decision.collections, decision.strategy
    );

    let mut all_nodes: Vec<ScoredNode> = Vec::new();
    for collection in &decision.collections {
        let Ok(category) = Category::from_str(collection) else {
            continue;
        };
        let result = retriever.retrieve(query, category).await?;
        all_nodes.extend(result.nodes);
    }
    all_nodes.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut lines = vec![
        format!(
            "Retrieved {} relevant documents for query: {query}",
            all_nodes.len()
        ),
        String::new(),
    ];

    for (i, node) in all_nodes.iter().enumerate() {
        lines.push(format!("Document {} (Score: {:.3}):", i + 1, node.score));
        lines.push(node.text.clone());
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

/// Tool descriptions shown to the agent.
#[must_use]
pub fn tool_description(name: &str) -> &'static str {
    match name {
        "retrieve_documents" => {
            "Retrieve relevant passages from the university knowledge base using \
             blended retrieval with reranking. Use this BEFORE answering factual \
             questions about regulations, curricula, admissions, or graduation."
        },
        "retrieve_regulation" => {
            "Retrieve structured passages from regulation documents (quy định, \
             quy chế, quyết định) with title, hierarchy, effective date, and score."
        },
        "retrieve_curriculum" => {
            "Retrieve structured passages from curriculum documents (chương trình \
             đào tạo) with major, year, program type, and score."
        },
        "get_grades" => "Fetch the student's grades from the academic portal.",
        "get_schedule" => "Fetch the student's schedule from the academic portal.",
        _ => "",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieve_params_schema_has_query() {
        let schema = schemars::schema_for!(RetrieveParams);
        let value = serde_json::to_value(schema).unwrap();
        assert!(value["properties"]["query"].is_object());
    }

    #[test]
    fn test_every_tool_has_a_description() {
        for name in [
            "retrieve_documents",
            "retrieve_regulation",
            "retrieve_curriculum",
            "get_grades",
            "get_schedule",
        ] {
            assert!(!tool_description(name).is_empty(), "{name} undescribed");
        }
    }
}
