//! Blended retrieval engine.
//!
//! Per query: NFC-normalize → optional HyDE expansion → dense vector search
//! (plus BM25 when enabled) → union dedupe → remote rerank → threshold
//! filter → program filter → truncate. Every step is pure with respect to
//! the collection; the engine is per-request stateless and safe to share
//! across requests after construction.
//!
//! Raw retrieval scores are recall signals only. Once the reranker runs, its
//! scores replace them for ranking; when it is disabled or times out, the
//! raw order stands and the result is flagged `reranked = false`.

pub mod format;
pub mod hyde;
pub mod program_filter;
pub mod reranker;
pub mod router;
pub mod schemas;

pub use format::ResultFormatter;
pub use hyde::HydeExpander;
pub use reranker::RerankerClient;
pub use router::{Router, RoutingDecision};
pub use schemas::{
    CurriculumDocument, CurriculumRetrievalResult, RegulationDocument, RegulationRetrievalResult,
};

use crate::config::RetrievalConfig;
use crate::lexical::LexicalIndex;
use crate::llm::Embedder;
use crate::types::{Category, ScoredNode};
use crate::vector::VectorStore;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

/// Result of one blended retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Final nodes, best first.
    pub nodes: Vec<ScoredNode>,
    /// Description of the retrieval path (`blended_regulation`).
    pub retrieval_method: String,
    /// True when the reranker's scores drove the final order.
    pub reranked: bool,
    /// Unique candidates before reranking.
    pub total_retrieved: usize,
    /// Final node count.
    pub final_count: usize,
}

/// Blended retriever over one vector store.
pub struct Retriever {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    lexical: Option<Arc<LexicalIndex>>,
    reranker: Option<RerankerClient>,
    hyde: Option<HydeExpander>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a retriever. `lexical`, `reranker`, and `hyde` are optional
    /// blend components; dense retrieval always runs.
    #[must_use]
    pub fn new(
        store: VectorStore,
        embedder: Arc<dyn Embedder>,
        lexical: Option<Arc<LexicalIndex>>,
        reranker: Option<RerankerClient>,
        hyde: Option<HydeExpander>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            lexical,
            reranker,
            hyde,
            config,
        }
    }

    /// Run blended retrieval for a query against one collection.
    pub async fn retrieve(&self, query: &str, collection: Category) -> Result<RetrievalResult> {
        let original_query: String = query.nfc().collect();

        // HyDE expands the query for embedding only; reranking and program
        // detection always see the original.
        let retrieval_query = match &self.hyde {
            Some(expander) => expander.expand(&original_query, collection).await,
            None => original_query.clone(),
        };

        info!(
            "Blended retrieval in '{}' for: {original_query}",
            collection.as_str()
        );

        let dense = self.retrieve_dense(&retrieval_query, collection).await?;
        debug!("Dense retrieval found {} nodes", dense.len());

        let lexical = if self.config.use_lexical {
            self.retrieve_lexical(&retrieval_query, collection)
        } else {
            Vec::new()
        };
        if self.config.use_lexical {
            debug!("Lexical retrieval found {} nodes", lexical.len());
        }

        // Union dedupe by node id, keeping the higher raw score on ties.
        let mut candidate_map: HashMap<String, ScoredNode> = HashMap::new();
        for node in dense.into_iter().chain(lexical) {
            match candidate_map.get(&node.id) {
                Some(existing) if existing.score >= node.score => {},
                _ => {
                    candidate_map.insert(node.id.clone(), node);
                },
            }
        }
        let mut candidates: Vec<ScoredNode> = candidate_map.into_values().collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        let total_retrieved = candidates.len();
        debug!("Total unique candidates: {total_retrieved}");

        let (mut nodes, reranked) = match (&self.reranker, candidates.is_empty()) {
            (Some(client), false) => self.rerank(client, &original_query, candidates).await,
            _ => (candidates, false),
        };

        if !reranked {
            // Raw similarity/BM25 scores are not comparable to reranker
            // output; clamp them into the result's score range.
            for node in &mut nodes {
                node.score = node.score.clamp(0.0, 1.0);
            }
        }

        let nodes = program_filter::apply_program_filter(&original_query, nodes);
        let nodes: Vec<ScoredNode> = nodes.into_iter().take(self.config.top_k).collect();

        info!(
            "Final result: {} nodes (reranked: {reranked})",
            nodes.len()
        );

        Ok(RetrievalResult {
            final_count: nodes.len(),
            retrieval_method: format!("blended_{}", collection.as_str()),
            reranked,
            total_retrieved,
            nodes,
        })
    }

    /// Retrieve and format a structured regulation result.
    pub async fn retrieve_regulation(&self, query: &str) -> Result<RegulationRetrievalResult> {
        let result = self.retrieve(query, Category::Regulation).await?;
        ResultFormatter::format_regulation(query, &result.nodes)
    }

    /// Retrieve and format a structured curriculum result.
    pub async fn retrieve_curriculum(&self, query: &str) -> Result<CurriculumRetrievalResult> {
        let result = self.retrieve(query, Category::Curriculum).await?;
        ResultFormatter::format_curriculum(query, &result.nodes)
    }

    async fn retrieve_dense(&self, query: &str, collection: Category) -> Result<Vec<ScoredNode>> {
        let embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Remote("embedder returned no vectors".to_string()))?;

        let nodes = self
            .store
            .search(
                collection.as_str(),
                &embedding,
                self.config.retrieval_top_k,
            )
            .await?;

        let before = nodes.len();
        let filtered: Vec<ScoredNode> = nodes
            .into_iter()
            .filter(|n| n.score >= self.config.min_score_threshold)
            .collect();
        if filtered.len() < before {
            debug!(
                "Filtered {} dense nodes below {}",
                before - filtered.len(),
                self.config.min_score_threshold
            );
        }
        Ok(filtered)
    }

    fn retrieve_lexical(&self, query: &str, collection: Category) -> Vec<ScoredNode> {
        let Some(index) = &self.lexical else {
            return Vec::new();
        };
        match index.search(query, collection.as_str(), self.config.retrieval_top_k) {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("Lexical retrieval failed ({e}), continuing with dense only");
                Vec::new()
            },
        }
    }

    /// Rerank candidates; on timeout or failure keep the raw order.
    async fn rerank(
        &self,
        client: &RerankerClient,
        query: &str,
        mut candidates: Vec<ScoredNode>,
    ) -> (Vec<ScoredNode>, bool) {
        let texts: Vec<String> = candidates.iter().map(|n| n.text.clone()).collect();

        let scores = match client.score(query, &texts).await {
            Ok(scores) => scores,
            Err(e @ Error::RemoteTimeout(_)) => {
                warn!("Reranker timed out ({e}); keeping raw-score order");
                return (candidates, false);
            },
            Err(e) => {
                warn!("Reranking failed ({e}); keeping raw-score order");
                return (candidates, false);
            },
        };

        for (node, score) in candidates.iter_mut().zip(scores) {
            node.score = score;
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));

        for (i, node) in candidates.iter().take(3).enumerate() {
            debug!(
                "Rerank top {}: {:.4} | {}",
                i + 1,
                node.score,
                node.document_id
            );
        }

        // Threshold filter; never return empty when anything was retrieved.
        let threshold = self.config.rerank_score_threshold;
        let kept: Vec<ScoredNode> = candidates
            .iter()
            .filter(|n| n.score >= threshold)
            .cloned()
            .collect();

        if kept.is_empty() && !candidates.is_empty() {
            warn!(
                "No results passed threshold {threshold}, returning top-1 (score {:.4})",
                candidates[0].score
            );
            return (vec![candidates.remove(0)], true);
        }

        if kept.len() < candidates.len() {
            debug!(
                "Filtered {} low-confidence results below {threshold}",
                candidates.len() - kept.len()
            );
        }

        (kept, true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Chunk, ChunkMetadata};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Orthogonal unit vectors keyed by marker substrings, so queries select
    /// documents deterministically.
    struct KeywordEmbedder;

    fn axis(text: &str) -> Vec<f32> {
        if text.contains("tốt nghiệp") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("học phí") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| axis(t)).collect())
        }

        fn model(&self) -> &str {
            "keyword-stub"
        }
    }

    fn chunk(id: &str, document_id: &str, text: &str) -> (Chunk, Vec<f32>) {
        let mut metadata = ChunkMetadata::new();
        metadata.insert("document_id".to_string(), json!(document_id));
        metadata.insert("title".to_string(), json!("Quy chế đào tạo"));
        metadata.insert("document_type".to_string(), json!("original"));
        metadata.insert("hierarchy".to_string(), json!("CHƯƠNG I > Điều 1"));
        let embedding = axis(text);
        (
            Chunk {
                id: id.to_string(),
                text: text.to_string(),
                metadata,
                start_char_idx: None,
                end_char_idx: None,
                relationships: serde_json::Map::new(),
            },
            embedding,
        )
    }

    async fn store_with_docs() -> VectorStore {
        let store = VectorStore::open_in_memory().await.unwrap();
        store
            .insert_chunks(
                "regulation",
                "790-qd-dhcntt",
                vec![
                    chunk("c1", "790-qd-dhcntt", "ctx\n---\nĐiều 33. Điều kiện tốt nghiệp..."),
                    chunk("c2", "790-qd-dhcntt", "ctx\n---\nĐiều 5. Quy định học phí..."),
                ],
            )
            .await
            .unwrap();
        store
            .insert_chunks(
                "curriculum",
                "cu-nhan-nganh-khoa-hoc-may-tinh-2022",
                vec![chunk(
                    "k1",
                    "cu-nhan-nganh-khoa-hoc-may-tinh-2022",
                    "ctx\n---\nDanh sách các học phần ngành KHMT",
                )],
            )
            .await
            .unwrap();
        store
            .insert_chunks(
                "curriculum",
                "cu-nhan-nganh-ky-thuat-may-tinh-2022",
                vec![chunk(
                    "k2",
                    "cu-nhan-nganh-ky-thuat-may-tinh-2022",
                    "ctx\n---\nDanh sách các học phần ngành KTMT",
                )],
            )
            .await
            .unwrap();
        store
    }

    fn config() -> RetrievalConfig {
        RetrievalConfig {
            min_score_threshold: 0.1,
            ..RetrievalConfig::default()
        }
    }

    #[tokio::test]
    async fn test_dense_retrieval_without_reranker() {
        let retriever = Retriever::new(
            store_with_docs().await,
            Arc::new(KeywordEmbedder),
            None,
            None,
            None,
            config(),
        );

        let result = retriever
            .retrieve("điều kiện tốt nghiệp", Category::Regulation)
            .await
            .unwrap();

        assert!(!result.reranked);
        assert!(result.final_count >= 1);
        assert_eq!(result.nodes[0].id, "c1");
        assert_eq!(result.retrieval_method, "blended_regulation");
        // Scores clamped into [0, 1] on the raw path.
        for node in &result.nodes {
            assert!((0.0..=1.0).contains(&node.score));
        }
    }

    #[tokio::test]
    async fn test_reranker_scores_replace_raw_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                // Second candidate wins after rerank.
                "scores": [0.2, 0.95]
            })))
            .mount(&server)
            .await;

        let retriever = Retriever::new(
            store_with_docs().await,
            Arc::new(KeywordEmbedder),
            None,
            Some(RerankerClient::new(&server.uri(), Duration::from_secs(5))),
            None,
            RetrievalConfig {
                min_score_threshold: -1.0,
                rerank_score_threshold: 0.5,
                ..RetrievalConfig::default()
            },
        );

        let result = retriever
            .retrieve("điều kiện tốt nghiệp", Category::Regulation)
            .await
            .unwrap();

        assert!(result.reranked);
        assert_eq!(result.final_count, 1);
        assert!((result.nodes[0].score - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_reranker_timeout_falls_back_to_raw_order() {
        // Nothing listens on this port; connect fails fast and the engine
        // keeps the raw order.
        let retriever = Retriever::new(
            store_with_docs().await,
            Arc::new(KeywordEmbedder),
            None,
            Some(RerankerClient::new(
                "http://127.0.0.1:9",
                Duration::from_millis(200),
            )),
            None,
            config(),
        );

        let result = retriever
            .retrieve("điều kiện tốt nghiệp", Category::Regulation)
            .await
            .unwrap();

        assert!(!result.reranked);
        assert!(result.final_count >= 1);
        assert_eq!(result.nodes[0].id, "c1");
    }

    #[tokio::test]
    async fn test_threshold_empties_keep_top_one() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "scores": [0.41, 0.12]
            })))
            .mount(&server)
            .await;

        let retriever = Retriever::new(
            store_with_docs().await,
            Arc::new(KeywordEmbedder),
            None,
            Some(RerankerClient::new(&server.uri(), Duration::from_secs(5))),
            None,
            RetrievalConfig {
                min_score_threshold: -1.0,
                rerank_score_threshold: 0.7,
                ..RetrievalConfig::default()
            },
        );

        let result = retriever
            .retrieve("điều kiện tốt nghiệp", Category::Regulation)
            .await
            .unwrap();

        assert!(result.reranked);
        assert_eq!(result.final_count, 1);
        assert!((result.nodes[0].score - 0.41).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_program_disambiguation() {
        let retriever = Retriever::new(
            store_with_docs().await,
            Arc::new(KeywordEmbedder),
            None,
            None,
            None,
            config(),
        );

        let result = retriever
            .retrieve(
                "môn học của ngành Khoa học máy tính khóa 2022",
                Category::Curriculum,
            )
            .await
            .unwrap();

        assert!(result.final_count >= 1);
        for node in &result.nodes {
            assert!(
                node.document_id.contains("khoa-hoc-may-tinh"),
                "cross-program leak: {}",
                node.document_id
            );
        }
    }

    #[tokio::test]
    async fn test_university_name_does_not_trigger_program_filter() {
        let retriever = Retriever::new(
            store_with_docs().await,
            Arc::new(KeywordEmbedder),
            None,
            None,
            None,
            config(),
        );

        let result = retriever
            .retrieve(
                "điều kiện tốt nghiệp của Trường Đại học Công nghệ Thông tin",
                Category::Regulation,
            )
            .await
            .unwrap();

        // General regulation results come back; the school name did not
        // activate any program slug.
        assert!(result.final_count >= 1);
        assert_eq!(result.nodes[0].document_id, "790-qd-dhcntt");
    }

    #[tokio::test]
    async fn test_structured_regulation_result() {
        let retriever = Retriever::new(
            store_with_docs().await,
            Arc::new(KeywordEmbedder),
            None,
            None,
            None,
            config(),
        );

        let result = retriever
            .retrieve_regulation("điều kiện tốt nghiệp")
            .await
            .unwrap();

        assert!(result.total_retrieved >= 1);
        let doc = &result.documents[0];
        assert!(doc.content.starts_with("Điều 33"));
        assert_eq!(doc.hierarchy, "CHƯƠNG I > Điều 1");
        assert!((0.0..=1.0).contains(&doc.score));
    }
}
