//! Error types for the sotay MCP server with MCP error-code mapping.

use thiserror::Error;

/// Errors that can occur in the MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] sotay_core::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid tool parameters.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Unknown tool name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A tool exceeded its per-call timeout.
    #[error("tool '{tool}' timed out after {seconds}s")]
    ToolTimeout {
        /// Tool that timed out.
        tool: String,
        /// Configured timeout in seconds.
        seconds: u64,
    },

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// Map error to a JSON-RPC error code.
    #[must_use]
    pub const fn error_code(&self) -> i32 {
        match self {
            Self::Core(_) | Self::Internal(_) | Self::ToolTimeout { .. } => -32603,
            Self::Json(_) => -32700,
            Self::Protocol(_) => -32600,
            Self::InvalidParams(_) | Self::UnknownTool(_) => -32602,
        }
    }
}

impl From<anyhow::Error> for McpError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type alias for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            McpError::UnknownTool("nope".to_string()).error_code(),
            -32602
        );
        assert_eq!(
            McpError::ToolTimeout {
                tool: "retrieve_regulation".to_string(),
                seconds: 120
            }
            .error_code(),
            -32603
        );
    }

    #[test]
    fn test_timeout_message_names_tool_and_timeout() {
        let err = McpError::ToolTimeout {
            tool: "get_grades".to_string(),
            seconds: 120,
        };
        let msg = err.to_string();
        assert!(msg.contains("get_grades"));
        assert!(msg.contains("120"));
    }
}
