//! Narrow client for the student-portal scraping collaborator.
//!
//! The scraper service holds the authenticated-crawling logic; this client
//! forwards a session cookie and returns its JSON payloads opaquely. The
//! core never interprets grade or schedule structures.

use crate::error::{McpError, McpResult};
use serde_json::Value;
use std::time::Duration;

/// HTTP client for the portal scraper service.
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
}

impl PortalClient {
    /// Create a client for the scraper service.
    #[must_use]
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the student's grades as opaque JSON.
    pub async fn get_grades(&self, cookie: &str) -> McpResult<Value> {
        self.forward("grades", cookie).await
    }

    /// Fetch the student's schedule as opaque JSON.
    pub async fn get_schedule(&self, cookie: &str) -> McpResult<Value> {
        self.forward("schedule", cookie).await
    }

    async fn forward(&self, endpoint: &str, cookie: &str) -> McpResult<Value> {
        let response = self
            .http
            .get(format!("{}/{endpoint}", self.base_url))
            .header(reqwest::header::COOKIE, cookie)
            .send()
            .await
            .map_err(|e| McpError::Internal(format!("portal {endpoint}: {e}")))?
            .error_for_status()
            .map_err(|e| McpError::Internal(format!("portal {endpoint}: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| McpError::Internal(format!("portal {endpoint} response: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_grades_forwarded_with_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/grades"))
            .and(header("cookie", "ASP.NET_SessionId=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "semesters": [{"name": "HK1 2024", "gpa": 8.2}]
            })))
            .mount(&server)
            .await;

        let client = PortalClient::new(&server.uri(), Duration::from_secs(5));
        let grades = client.get_grades("ASP.NET_SessionId=abc").await.unwrap();
        assert_eq!(grades["semesters"][0]["gpa"], 8.2);
    }

    #[tokio::test]
    async fn test_error_status_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schedule"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = PortalClient::new(&server.uri(), Duration::from_secs(5));
        assert!(client.get_schedule("expired").await.is_err());
    }
}
