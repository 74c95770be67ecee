//! MCP server implementation over stdio.

use crate::error::{McpError, McpResult};
use crate::host::{ToolCall, ToolHost, ToolMessage};
use crate::tools;
use rmcp::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorData, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// MCP server exposing the sotay tool host.
#[derive(Clone)]
pub struct McpServer {
    host: Arc<ToolHost>,
    call_counter: Arc<AtomicU64>,
}

impl McpServer {
    /// Create a server over a tool host.
    #[must_use]
    pub fn new(host: Arc<ToolHost>) -> Self {
        Self {
            host,
            call_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Serve the MCP protocol over stdio until the client disconnects.
    pub async fn serve_stdio(&self) -> McpResult<()> {
        tracing::info!("sotay MCP server starting");

        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();

        let service = rmcp::serve_server(self.clone(), (stdin, stdout))
            .await
            .map_err(|e| McpError::Protocol(e.to_string()))?;

        service
            .waiting()
            .await
            .map_err(|e| McpError::Protocol(e.to_string()))?;

        tracing::info!("sotay MCP server stopped");
        Ok(())
    }

    fn tool_entries(&self) -> Vec<Tool> {
        self.host
            .tool_names()
            .into_iter()
            .map(|name| {
                let schema = if name.starts_with("get_") {
                    schemars::schema_for!(tools::PortalParams)
                } else {
                    schemars::schema_for!(tools::RetrieveParams)
                };
                let schema_object = serde_json::to_value(schema)
                    .ok()
                    .and_then(|v| v.as_object().cloned())
                    .unwrap_or_default();

                Tool::new(
                    Cow::Borrowed(name),
                    Cow::Borrowed(tools::tool_description(name)),
                    Arc::new(schema_object),
                )
            })
            .collect()
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sotay-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Retrieval over the university regulations and curricula knowledge \
                 base, plus authenticated portal lookups. Always retrieve before \
                 answering factual questions."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tool_entries(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let call_id = self.call_counter.fetch_add(1, Ordering::Relaxed);
        let call = ToolCall {
            name: request.name.to_string(),
            tool_call_id: format!("call-{call_id}"),
            args: request
                .arguments
                .map(serde_json::Value::Object)
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
        };

        match self.host.dispatch(call).await {
            ToolMessage::Output { content, .. } => {
                let text = match content {
                    serde_json::Value::String(s) => s,
                    other => serde_json::to_string_pretty(&other)
                        .map_err(|e| ErrorData::internal_error(e.to_string(), None))?,
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            },
            ToolMessage::Error { content, .. } => {
                Ok(CallToolResult::error(vec![Content::text(content)]))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sotay_core::llm::Embedder;
    use sotay_core::{RetrievalConfig, Retriever, Router, VectorStore};
    use std::time::Duration;

    struct UnitEmbedder;

    #[async_trait::async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, texts: &[String]) -> sotay_core::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }

        fn model(&self) -> &str {
            "unit"
        }
    }

    async fn server() -> McpServer {
        let store = VectorStore::open_in_memory().await.unwrap();
        let retriever = Arc::new(Retriever::new(
            store,
            Arc::new(UnitEmbedder),
            None,
            None,
            None,
            RetrievalConfig::default(),
        ));
        let router = Arc::new(Router::query_all(vec!["regulation".to_string()]));
        let host = Arc::new(ToolHost::new(
            retriever,
            router,
            None,
            Duration::from_secs(5),
        ));
        McpServer::new(host)
    }

    #[tokio::test]
    async fn test_server_info() {
        let server = server().await;
        let info = server.get_info();
        assert_eq!(info.server_info.name, "sotay-mcp");
        assert!(!info.server_info.version.is_empty());
    }

    #[tokio::test]
    async fn test_tool_entries_cover_host_tools() {
        let server = server().await;
        let tools = server.tool_entries();
        let names: Vec<_> = tools.iter().map(|t| t.name.to_string()).collect();
        assert!(names.contains(&"retrieve_documents".to_string()));
        assert!(names.contains(&"retrieve_regulation".to_string()));
        assert!(names.contains(&"retrieve_curriculum".to_string()));
        // No portal client configured, so no portal tools.
        assert!(!names.contains(&"get_grades".to_string()));
    }
}
