//! HyDE: hypothetical-document query expansion.
//!
//! Instead of embedding the raw query, embed a generated hypothetical
//! answer — generated answers sit closer to real documents in vector space.
//! The original query still drives reranking and program detection.

use crate::llm::Completer;
use crate::types::Category;
use std::sync::Arc;
use tracing::{debug, warn};

/// Hypothetical-document generator.
pub struct HydeExpander {
    completer: Arc<dyn Completer>,
}

impl HydeExpander {
    /// Create an expander over a small completer.
    #[must_use]
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self { completer }
    }

    /// Generate a 100–200 word hypothetical answer for the query.
    ///
    /// Any failure falls back to the raw query with a log line; expansion is
    /// best-effort.
    pub async fn expand(&self, query: &str, collection: Category) -> String {
        let context = match collection {
            Category::Regulation => "quy định, quy chế, văn bản hành chính của trường đại học",
            Category::Curriculum => "chương trình đào tạo, môn học, học phần của các ngành",
        };

        let prompt = format!(
            r#"Bạn là chuyên gia về {context}.

Câu hỏi: {query}

Hãy viết một đoạn văn ngắn (100-200 từ) MÔ TẢ câu trả lời có thể có cho câu hỏi trên.
Không cần chính xác 100%, chỉ cần viết DẠNG văn bản mà câu trả lời sẽ có.

Quy tắc:
- Viết như thể bạn đang TRẢ LỜI câu hỏi (không nói "Câu trả lời sẽ bao gồm...")
- Sử dụng các từ khóa và thuật ngữ liên quan
- Giữ phong cách giống văn bản {context}
- Ngắn gọn, súc tích (100-200 từ)

Đoạn văn:"#
        );

        match self.completer.complete(&prompt).await {
            Ok(text) => {
                let text = text.trim().to_string();
                debug!("HyDE generated {} chars", text.len());
                text
            },
            Err(e) => {
                warn!("HyDE generation failed ({e}), falling back to raw query");
                query.to_string()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use async_trait::async_trait;

    struct StaticCompleter(String);

    #[async_trait]
    impl Completer for StaticCompleter {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }

        fn model(&self) -> &str {
            "static"
        }
    }

    struct FailingCompleter;

    #[async_trait]
    impl Completer for FailingCompleter {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(crate::Error::RemoteTimeout("hyde".to_string()))
        }

        fn model(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_expansion_returns_generated_text() {
        let expander = HydeExpander::new(Arc::new(StaticCompleter(
            "Sinh viên được xét tốt nghiệp khi tích lũy đủ tín chỉ...".to_string(),
        )));
        let expanded = expander
            .expand("điều kiện tốt nghiệp", Category::Regulation)
            .await;
        assert!(expanded.contains("tín chỉ"));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_query() {
        let expander = HydeExpander::new(Arc::new(FailingCompleter));
        let expanded = expander
            .expand("điều kiện tốt nghiệp", Category::Regulation)
            .await;
        assert_eq!(expanded, "điều kiện tốt nghiệp");
    }
}
