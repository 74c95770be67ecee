//! Query routing: select which collections to consult.

use crate::config::RoutingStrategy;
use crate::llm::Completer;
use std::sync::Arc;
use tracing::warn;

/// Short Vietnamese description per collection, used in the classification
/// prompt.
fn collection_description(collection: &str) -> &'static str {
    match collection {
        "regulation" => {
            "Quy định, quy chế, quyết định, quy trình, hướng dẫn về chính sách và quản lý"
        },
        "curriculum" => {
            "Chương trình đào tạo, danh mục môn học, nội dung học phần, kế hoạch đào tạo"
        },
        _ => "Không có mô tả",
    }
}

/// Routing outcome.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    /// Collections to query.
    pub collections: Vec<String>,
    /// Strategy that produced the decision.
    pub strategy: String,
    /// Human-readable reasoning.
    pub reasoning: String,
}

/// Collection router.
pub struct Router {
    strategy: RoutingStrategy,
    available_collections: Vec<String>,
    classifier: Option<Arc<dyn Completer>>,
}

impl Router {
    /// Router that always queries every available collection.
    #[must_use]
    pub fn query_all(available_collections: Vec<String>) -> Self {
        Self {
            strategy: RoutingStrategy::QueryAll,
            available_collections,
            classifier: None,
        }
    }

    /// Router that classifies queries with a fast LLM.
    #[must_use]
    pub fn llm_classification(
        available_collections: Vec<String>,
        classifier: Arc<dyn Completer>,
    ) -> Self {
        Self {
            strategy: RoutingStrategy::LlmClassification,
            available_collections,
            classifier: Some(classifier),
        }
    }

    /// Collections this router can choose from.
    #[must_use]
    pub fn available_collections(&self) -> &[String] {
        &self.available_collections
    }

    /// Route a query to a subset of collections.
    ///
    /// LLM failures and unparseable classifications fall back to all
    /// collections; routing never fails a request.
    pub async fn route(&self, query: &str) -> RoutingDecision {
        match (self.strategy, &self.classifier) {
            (RoutingStrategy::LlmClassification, Some(classifier)) => {
                self.route_by_classification(query, classifier.as_ref()).await
            },
            _ => RoutingDecision {
                collections: self.available_collections.clone(),
                strategy: "query_all".to_string(),
                reasoning: "Querying all available collections".to_string(),
            },
        }
    }

    async fn route_by_classification(
        &self,
        query: &str,
        classifier: &dyn Completer,
    ) -> RoutingDecision {
        let prompt = self.build_classification_prompt(query);

        let classification = match classifier.complete(&prompt).await {
            Ok(text) => text.trim().to_lowercase(),
            Err(e) => {
                warn!("Classification failed: {e}. Falling back to all collections");
                return RoutingDecision {
                    collections: self.available_collections.clone(),
                    strategy: "llm_classification_fallback".to_string(),
                    reasoning: format!("LLM error, querying all collections: {e}"),
                };
            },
        };

        let collections = self.parse_classification(&classification);
        RoutingDecision {
            collections,
            strategy: "llm_classification".to_string(),
            reasoning: format!("LLM classified query as: {classification}"),
        }
    }

    /// Parse a classification response by substring match against collection
    /// names. `all` means everything; no match falls back to everything.
    fn parse_classification(&self, classification: &str) -> Vec<String> {
        if classification.contains("all") {
            return self.available_collections.clone();
        }

        let selected: Vec<String> = self
            .available_collections
            .iter()
            .filter(|c| classification.contains(c.as_str()))
            .cloned()
            .collect();

        if selected.is_empty() {
            warn!("Could not parse classification '{classification}', using all collections");
            return self.available_collections.clone();
        }

        selected
    }

    fn build_classification_prompt(&self, query: &str) -> String {
        let options = self
            .available_collections
            .iter()
            .map(|c| format!("- {c}: {}", collection_description(c)))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Phân loại câu hỏi vào collection phù hợp.

Collections:
{options}

Câu hỏi: "{query}"

### NGUYÊN TẮC PHÂN LOẠI

Người dùng đang hỏi về NGÀNH/CHƯƠNG TRÌNH ĐÀO TẠO CỤ THỂ hay CHÍNH SÁCH CHUNG
của trường?

#### BƯỚC 1: Câu hỏi có đề cập đến NGÀNH CỤ THỂ không?

PHÂN BIỆT TÊN TRƯỜNG vs TÊN NGÀNH:
- "Trường/Đại học Công nghệ Thông tin" = Tên TRƯỜNG (UIT) -> KHÔNG PHẢI ngành
- "Ngành Công nghệ Thông tin" = Tên NGÀNH -> LÀ ngành cụ thể
- "UIT", "ĐHCNTT", "trường" -> chỉ nơi học, KHÔNG phải ngành

Tín hiệu về NGÀNH CỤ THỂ:
- Từ khóa: "ngành X", "chuyên ngành X", "chương trình đào tạo X", "CTĐT X"
- Viết tắt ngành: CNTT, KHMT, KTPM, KTMT, AI, TTNT, ATTT, KHDL, MMT&TT, HTTT, TMĐT
- Tên ngành đầy đủ: "Khoa học máy tính", "Kỹ thuật phần mềm", "Trí tuệ nhân tạo",
  "An toàn thông tin", "Khoa học dữ liệu", "Kỹ thuật máy tính",
  "Hệ thống thông tin", "Thương mại điện tử",
  "Mạng máy tính và Truyền thông dữ liệu",
  "Công nghệ thông tin" (KHI đi cùng "ngành" hoặc viết tắt CNTT)

Nếu CÓ tín hiệu ngành cụ thể -> BƯỚC 2
Nếu KHÔNG (chỉ có tên trường hoặc hỏi chung chung) -> regulation

#### BƯỚC 2: Có phải chủ đề về chính sách/tài chính không?

Các chủ đề sau LUÔN là regulation (bất kể có nhắc ngành hay không):
- Học phí, chi phí, lệ phí, miễn giảm
- Học bổng, hỗ trợ tài chính
- Quy chế, quy định, quyết định chung của trường
- Thủ tục hành chính: nhập học, chuyển trường, bảo lưu, thôi học

Nếu là chủ đề trên -> regulation
Nếu KHÔNG -> curriculum

### VÍ DỤ
- "Điều kiện tốt nghiệp ngành KTPM 2025" -> curriculum
- "Học phí ngành CNTT 2024" -> regulation (chủ đề học phí)
- "Điều kiện tốt nghiệp của UIT là gì?" -> regulation (chỉ có tên trường)
- "Trường Đại học Công nghệ Thông tin có bao nhiêu tín chỉ?" -> regulation

Trả về: Chỉ ghi TÊN COLLECTION, không giải thích.

Phân loại:"#
        )
    }
}
