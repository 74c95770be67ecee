//! Remote reranker client.
//!
//! Wire protocol: POST `{query, texts, normalize: true}` →
//! `{scores: [float]}`, scores ordered like `texts`. The timeout is generous
//! because the GPU endpoint cold-starts in tens of seconds; the retriever
//! treats a timeout as "keep the raw order", never as a request failure.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    normalize: bool,
}

#[derive(Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

/// HTTP client for the remote reranking endpoint.
pub struct RerankerClient {
    http: reqwest::Client,
    url: String,
}

impl RerankerClient {
    /// Create a client for a reranker endpoint with a call timeout.
    #[must_use]
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            url: url.to_string(),
        }
    }

    /// Score texts against a query. One score per text, same order.
    pub async fn score(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Reranking {} texts", texts.len());
        let response = self
            .http
            .post(&self.url)
            .json(&RerankRequest {
                query,
                texts,
                normalize: true,
            })
            .send()
            .await
            .map_err(|e| Error::from_remote("reranker", &e))?
            .error_for_status()
            .map_err(|e| Error::Remote(format!("reranker: {e}")))?;

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| Error::Remote(format!("reranker response: {e}")))?;

        if parsed.scores.len() != texts.len() {
            return Err(Error::Remote(format!(
                "reranker returned {} scores for {} texts",
                parsed.scores.len(),
                texts.len()
            )));
        }

        Ok(parsed.scores)
    }
}
