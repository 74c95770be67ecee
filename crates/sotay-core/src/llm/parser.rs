//! Remote document-parser client.
//!
//! The parse stage reaches a hosted parsing service that converts
//! PDF/DOCX/XLSX to markdown. The wire contract is deliberately narrow: the
//! raw file bytes are POSTed with the filename as a query parameter, and the
//! service answers `{markdown, cost}`.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const PARSE_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of parsing one source document.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedDocument {
    /// Markdown rendition of the document.
    pub markdown: String,
    /// Monetary cost of the parse call in USD.
    #[serde(default)]
    pub cost: f64,
}

/// HTTP implementation of [`super::DocumentParser`].
pub struct HttpDocumentParser {
    http: reqwest::Client,
    url: String,
}

impl HttpDocumentParser {
    /// Create a client for a parser service endpoint.
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(PARSE_TIMEOUT)
                .build()
                .unwrap_or_default(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl super::DocumentParser for HttpDocumentParser {
    async fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Input(format!("Failed to read {}: {e}", path.display())))?;

        if bytes.is_empty() {
            return Err(Error::Input(format!(
                "Input file is empty: {}",
                path.display()
            )));
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document");

        let response = self
            .http
            .post(&self.url)
            .query(&[("filename", filename)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::from_remote("parser request", &e))?
            .error_for_status()
            .map_err(|e| Error::Remote(format!("parser request: {e}")))?;

        let parsed: ParsedDocument = response
            .json()
            .await
            .map_err(|e| Error::Remote(format!("parser response: {e}")))?;

        if parsed.markdown.trim().is_empty() {
            return Err(Error::Remote(format!(
                "parser returned empty markdown for {filename}"
            )));
        }

        Ok(parsed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::llm::DocumentParser;
    use std::io::Write;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_parse_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("filename", "doc.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "markdown": "# Tiêu đề\n\nNội dung.",
                "cost": 0.03
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"%PDF-1.4 fake").unwrap();

        let parser = HttpDocumentParser::new(&server.uri());
        let parsed = parser.parse(&path).await.unwrap();
        assert!(parsed.markdown.contains("Tiêu đề"));
        assert!((parsed.cost - 0.03).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_file_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pdf");
        std::fs::File::create(&path).unwrap();

        let parser = HttpDocumentParser::new("http://localhost:9");
        let err = parser.parse(&path).await.unwrap_err();
        assert_eq!(err.category(), "input");
    }

    #[tokio::test]
    async fn test_empty_markdown_is_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "markdown": "   ",
                "cost": 0.0
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"data").unwrap();

        let parser = HttpDocumentParser::new(&server.uri());
        let err = parser.parse(&path).await.unwrap_err();
        assert_eq!(err.category(), "remote");
    }
}
