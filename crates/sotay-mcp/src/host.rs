//! Tool host: dispatch of agent tool calls with parallel fan-out.
//!
//! The agent may request several tools in one turn; the host runs them
//! concurrently with a per-call timeout and joins the results. One tool's
//! failure becomes a typed tool-error message and never aborts its siblings.

use crate::error::{McpError, McpResult};
use crate::portal::PortalClient;
use crate::tools;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sotay_core::{Retriever, Router};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// One tool invocation request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Caller-assigned call id, echoed back in the response.
    pub tool_call_id: String,
    /// JSON arguments object.
    pub args: Value,
}

/// Response to one tool invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolMessage {
    /// Successful tool output.
    Output {
        /// Tool name.
        name: String,
        /// Echoed call id.
        tool_call_id: String,
        /// Tool output payload.
        content: Value,
    },
    /// Typed tool error.
    Error {
        /// Tool name.
        name: String,
        /// Echoed call id.
        tool_call_id: String,
        /// Short diagnostic.
        content: String,
        /// Always `"error"`.
        status: String,
    },
}

impl ToolMessage {
    fn error(call: &ToolCall, err: &McpError) -> Self {
        Self::Error {
            name: call.name.clone(),
            tool_call_id: call.tool_call_id.clone(),
            content: err.to_string(),
            status: "error".to_string(),
        }
    }
}

/// Host exposing retrieval and portal tools to an agent runtime.
pub struct ToolHost {
    retriever: Arc<Retriever>,
    router: Arc<Router>,
    portal: Option<Arc<PortalClient>>,
    call_timeout: Duration,
}

impl ToolHost {
    /// Create a host over the shared retrieval engine and optional portal
    /// client. `call_timeout` bounds every individual tool call; the default
    /// of 120 s rides out cold starts on the remote services.
    #[must_use]
    pub fn new(
        retriever: Arc<Retriever>,
        router: Arc<Router>,
        portal: Option<Arc<PortalClient>>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            router,
            portal,
            call_timeout,
        }
    }

    /// Per-call timeout in seconds.
    #[must_use]
    pub const fn timeout_secs(&self) -> u64 {
        self.call_timeout.as_secs()
    }

    /// Names of the exposed tools.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&'static str> {
        let mut names = vec![
            "retrieve_documents",
            "retrieve_regulation",
            "retrieve_curriculum",
        ];
        if self.portal.is_some() {
            names.push("get_grades");
            names.push("get_schedule");
        }
        names
    }

    /// Dispatch one tool call with the per-call timeout.
    pub async fn dispatch(&self, call: ToolCall) -> ToolMessage {
        let timed = tokio::time::timeout(self.call_timeout, self.execute(&call)).await;

        match timed {
            Ok(Ok(content)) => ToolMessage::Output {
                name: call.name.clone(),
                tool_call_id: call.tool_call_id.clone(),
                content,
            },
            Ok(Err(err)) => {
                warn!("Tool '{}' failed: {err}", call.name);
                ToolMessage::error(&call, &err)
            },
            Err(_) => {
                let err = McpError::ToolTimeout {
                    tool: call.name.clone(),
                    seconds: self.call_timeout.as_secs(),
                };
                warn!("{err}");
                ToolMessage::error(&call, &err)
            },
        }
    }

    /// Dispatch a batch of tool calls in parallel and join the results.
    ///
    /// Results come back in request order; failures are per-call.
    pub async fn dispatch_batch(&self, calls: Vec<ToolCall>) -> Vec<ToolMessage> {
        join_all(calls.into_iter().map(|call| self.dispatch(call))).await
    }

    async fn execute(&self, call: &ToolCall) -> McpResult<Value> {
        match call.name.as_str() {
            "retrieve_documents" => {
                let query = require_str(&call.args, "query")?;
                let text =
                    tools::retrieve_documents(&self.retriever, &self.router, query).await?;
                Ok(Value::String(text))
            },
            "retrieve_regulation" => {
                let query = require_str(&call.args, "query")?;
                let result = self.retriever.retrieve_regulation(query).await?;
                Ok(serde_json::to_value(result)?)
            },
            "retrieve_curriculum" => {
                let query = require_str(&call.args, "query")?;
                let result = self.retriever.retrieve_curriculum(query).await?;
                Ok(serde_json::to_value(result)?)
            },
            "get_grades" => {
                let cookie = require_str(&call.args, "cookie")?;
                self.portal_client()?.get_grades(cookie).await
            },
            "get_schedule" => {
                let cookie = require_str(&call.args, "cookie")?;
                self.portal_client()?.get_schedule(cookie).await
            },
            other => Err(McpError::UnknownTool(other.to_string())),
        }
    }

    fn portal_client(&self) -> McpResult<&PortalClient> {
        self.portal
            .as_deref()
            .ok_or_else(|| McpError::Internal("portal client is not configured".to_string()))
    }
}

fn require_str<'a>(args: &'a Value, key: &str) -> McpResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| McpError::InvalidParams(format!("missing required parameter '{key}'")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use sotay_core::llm::Embedder;
    use sotay_core::types::{Chunk, ChunkMetadata};
    use sotay_core::{RetrievalConfig, VectorStore};

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, texts: &[String]) -> sotay_core::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn model(&self) -> &str {
            "unit"
        }
    }

    async fn host() -> ToolHost {
        let store = VectorStore::open_in_memory().await.unwrap();
        let mut metadata = ChunkMetadata::new();
        metadata.insert("title".to_string(), json!("Quy chế đào tạo"));
        metadata.insert("document_type".to_string(), json!("original"));
        metadata.insert("hierarchy".to_string(), json!("CHƯƠNG V > Điều 33"));
        store
            .insert_chunks(
                "regulation",
                "790-qd-dhcntt",
                vec![(
                    Chunk {
                        id: "c1".to_string(),
                        text: "ctx\n---\nĐiều 33. Điều kiện tốt nghiệp".to_string(),
                        metadata,
                        start_char_idx: None,
                        end_char_idx: None,
                        relationships: serde_json::Map::new(),
                    },
                    vec![1.0, 0.0],
                )],
            )
            .await
            .unwrap();

        let retriever = Arc::new(Retriever::new(
            store,
            Arc::new(UnitEmbedder),
            None,
            None,
            None,
            RetrievalConfig {
                min_score_threshold: 0.1,
                ..RetrievalConfig::default()
            },
        ));
        let router = Arc::new(Router::query_all(vec![
            "regulation".to_string(),
            "curriculum".to_string(),
        ]));
        ToolHost::new(retriever, router, None, Duration::from_secs(5))
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            tool_call_id: format!("{name}-1"),
            args,
        }
    }

    #[tokio::test]
    async fn test_retrieve_regulation_returns_structured_result() {
        let host = host().await;
        let message = host
            .dispatch(call(
                "retrieve_regulation",
                json!({"query": "điều kiện tốt nghiệp"}),
            ))
            .await;

        match message {
            ToolMessage::Output { content, .. } => {
                assert!(content["total_retrieved"].as_u64().unwrap() >= 1);
                assert_eq!(
                    content["documents"][0]["hierarchy"],
                    "CHƯƠNG V > Điều 33"
                );
            },
            ToolMessage::Error { content, .. } => panic!("unexpected error: {content}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_typed_error() {
        let host = host().await;
        let message = host.dispatch(call("no_such_tool", json!({}))).await;

        match message {
            ToolMessage::Error {
                name,
                status,
                content,
                ..
            } => {
                assert_eq!(name, "no_such_tool");
                assert_eq!(status, "error");
                assert!(content.contains("unknown tool"));
            },
            ToolMessage::Output { .. } => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn test_missing_query_is_invalid_params() {
        let host = host().await;
        let message = host.dispatch(call("retrieve_regulation", json!({}))).await;
        match message {
            ToolMessage::Error { content, .. } => assert!(content.contains("query")),
            ToolMessage::Output { .. } => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn test_batch_failures_do_not_abort_siblings() {
        let host = host().await;
        let messages = host
            .dispatch_batch(vec![
                call("retrieve_regulation", json!({"query": "tốt nghiệp"})),
                call("no_such_tool", json!({})),
                call("retrieve_documents", json!({"query": "tốt nghiệp"})),
            ])
            .await;

        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], ToolMessage::Output { .. }));
        assert!(matches!(messages[1], ToolMessage::Error { .. }));
        assert!(matches!(messages[2], ToolMessage::Output { .. }));
    }

    #[tokio::test]
    async fn test_tool_error_serialization_shape() {
        let host = host().await;
        let message = host.dispatch(call("no_such_tool", json!({}))).await;
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["name"], "no_such_tool");
        assert_eq!(value["tool_call_id"], "no_such_tool-1");
        assert!(value["content"].is_string());
    }
}
