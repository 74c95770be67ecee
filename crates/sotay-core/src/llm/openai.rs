//! OpenAI-compatible HTTP clients for completion and embedding.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

/// Completer backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompleter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompleter {
    /// Create a completer for a model at the given API base.
    #[must_use]
    pub fn new(base_url: &str, api_key: &str, model: &str, temperature: f32) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait]
impl super::Completer for OpenAiCompleter {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::from_remote("completion request", &e))?
            .error_for_status()
            .map_err(|e| Error::Remote(format!("completion request: {e}")))?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Remote(format!("completion response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::Remote(format!(
                "empty completion from model {}",
                self.model
            )));
        }

        Ok(text)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    /// Create an embedder for a model at the given API base.
    #[must_use]
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl super::Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::from_remote("embedding request", &e))?
            .error_for_status()
            .map_err(|e| Error::Remote(format!("embedding request: {e}")))?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Remote(format!("embedding response: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(Error::Remote(format!(
                "embedding count mismatch: sent {} texts, got {} vectors",
                texts.len(),
                parsed.data.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::llm::{Completer, Embedder};
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_completer_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "regulation"}}]
            })))
            .mount(&server)
            .await;

        let completer = OpenAiCompleter::new(&server.uri(), "test-key", "gpt-4o-mini", 0.0);
        let text = completer.complete("Phân loại câu hỏi").await.unwrap();
        assert_eq!(text, "regulation");
        assert_eq!(completer.model(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_completer_rejects_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": ""}}]
            })))
            .mount(&server)
            .await;

        let completer = OpenAiCompleter::new(&server.uri(), "k", "m", 0.0);
        assert!(completer.complete("prompt").await.is_err());
    }

    #[tokio::test]
    async fn test_embedder_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"embedding": [0.1, 0.2]},
                    {"embedding": [0.3, 0.4]}
                ]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&server.uri(), "k", "text-embedding-3-small");
        let vectors = embedder
            .embed(&["một".to_string(), "hai".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn test_embedder_count_mismatch_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1]}]
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new(&server.uri(), "k", "m");
        let result = embedder.embed(&["a".to_string(), "b".to_string()]).await;
        assert!(result.is_err());
    }
}
