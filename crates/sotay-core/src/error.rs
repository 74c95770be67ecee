//! Error types and handling for sotay-core operations.
//!
//! Every fallible operation in the crate returns [`Result<T, Error>`]. The
//! variants follow the failure kinds of the pipeline and retrieval engine:
//!
//! - **Input**: missing/empty input files, unknown categories
//! - **Stage**: a pipeline stage's execute step raised
//! - **QualityRejection**: the filter stage rejected a document
//! - **RemoteTimeout / Remote**: reranker, LLM, embedder or parser calls
//! - **LockViolation**: attempted overwrite of a manually edited artifact
//! - **ClassificationUnparseable**: router LLM output matched no collection
//!
//! Recovery policy: errors that have a safe fallback (reranker timeout,
//! unparseable classification, malformed sidecar) are handled at the call
//! site and never propagate out of the engine; everything that would make an
//! artifact wrong (parse failure, rejection, embed failure) surfaces.

use thiserror::Error;

/// The main error type for sotay-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed.
    ///
    /// Covers HTTP traffic to the reranker, LLM providers, the embedding
    /// service and the document parser. The underlying `reqwest::Error` is
    /// preserved so timeouts can be told apart from other failures.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Input file is missing, empty, or otherwise unusable.
    #[error("Input error: {0}")]
    Input(String),

    /// Unrecognized document category.
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// A pipeline stage's execute step failed.
    #[error("Stage '{stage}' failed: {message}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// Failure detail recorded in the stage metadata.
        message: String,
    },

    /// The filter stage rejected the document's content.
    ///
    /// The content has already been copied to the rejected area by the time
    /// this error is raised; the pipeline aborts for this document.
    #[error("Content rejected: {reason}")]
    QualityRejection {
        /// Why the content was rejected.
        reason: String,
    },

    /// A remote call (reranker, LLM, embedder, parser) exceeded its timeout.
    #[error("Remote timeout: {0}")]
    RemoteTimeout(String),

    /// A remote call failed for a non-timeout reason.
    #[error("Remote failure: {0}")]
    Remote(String),

    /// Attempt to overwrite a stage whose record is manually edited.
    #[error("Stage '{0}' is locked (manually edited)")]
    LockViolation(String),

    /// The classification LLM returned text naming no known collection.
    #[error("Unparseable classification: {0}")]
    ClassificationUnparseable(String),

    /// Vector store operation failed.
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Lexical index operation failed.
    #[error("Index error: {0}")]
    Index(String),

    /// Local storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Requested resource was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Build a `Remote` or `RemoteTimeout` error from a reqwest failure.
    ///
    /// Timeouts get their own variant because the retrieval engine treats
    /// them as recoverable (fall back to raw ordering) while other remote
    /// failures propagate to the caller.
    #[must_use]
    pub fn from_remote(context: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::RemoteTimeout(format!("{context}: {err}"))
        } else {
            Self::Remote(format!("{context}: {err}"))
        }
    }

    /// Check if the error might be recoverable through retry or fallback.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::RemoteTimeout(_) | Self::ClassificationUnparseable(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a string identifier for logs and metrics.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Input(_) => "input",
            Self::UnknownCategory(_) => "unknown_category",
            Self::Stage { .. } => "stage",
            Self::QualityRejection { .. } => "quality_rejection",
            Self::RemoteTimeout(_) => "remote_timeout",
            Self::Remote(_) => "remote",
            Self::LockViolation(_) => "lock_violation",
            Self::ClassificationUnparseable(_) => "classification_unparseable",
            Self::VectorStore(_) => "vector_store",
            Self::Index(_) => "index",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::NotFound(_) => "not_found",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io;

    #[test]
    fn test_error_display_formatting() {
        let errors = vec![
            Error::Input("missing file".to_string()),
            Error::Storage("disk full".to_string()),
            Error::Config("missing field".to_string()),
            Error::RemoteTimeout("reranker".to_string()),
            Error::LockViolation("fix-markdown".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }

        let stage_err = Error::Stage {
            stage: "parse".to_string(),
            message: "empty output".to_string(),
        };
        assert!(stage_err.to_string().contains("parse"));
        assert!(stage_err.to_string().contains("empty output"));
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::Input("x".into()).category(), "input");
        assert_eq!(
            Error::QualityRejection {
                reason: "too short".into()
            }
            .category(),
            "quality_rejection"
        );
        assert_eq!(
            Error::RemoteTimeout("x".into()).category(),
            "remote_timeout"
        );
        assert_eq!(
            Error::LockViolation("clean".into()).category(),
            "lock_violation"
        );
        assert_eq!(
            Error::ClassificationUnparseable("?".into()).category(),
            "classification_unparseable"
        );
    }

    #[test]
    fn test_error_recoverability() {
        assert!(Error::RemoteTimeout("reranker".into()).is_recoverable());
        assert!(Error::ClassificationUnparseable("x".into()).is_recoverable());
        assert!(Error::Io(io::Error::new(io::ErrorKind::TimedOut, "t")).is_recoverable());

        assert!(!Error::Input("empty".into()).is_recoverable());
        assert!(
            !Error::QualityRejection {
                reason: "nav page".into()
            }
            .is_recoverable()
        );
        assert!(!Error::LockViolation("fix".into()).is_recoverable());
        assert!(!Error::VectorStore("insert failed".into()).is_recoverable());
    }

    #[test]
    fn test_error_chain_source() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_error.into();

        let source = std::error::Error::source(&err);
        assert!(source.is_some());
        assert!(source.unwrap().to_string().contains("access denied"));
    }

    proptest! {
        #[test]
        fn test_input_error_with_arbitrary_messages(msg in r".{0,500}") {
            let error = Error::Input(msg.clone());
            prop_assert!(error.to_string().contains("Input error"));
            prop_assert!(error.to_string().contains(&msg));
            prop_assert_eq!(error.category(), "input");
            prop_assert!(!error.is_recoverable());
        }

        #[test]
        fn test_remote_timeout_with_arbitrary_messages(msg in r".{0,500}") {
            let error = Error::RemoteTimeout(msg.clone());
            prop_assert!(error.to_string().contains(&msg));
            prop_assert_eq!(error.category(), "remote_timeout");
            prop_assert!(error.is_recoverable());
        }
    }
}
