//! Metadata extraction for curriculum documents.

use super::{MetadataGenerator, parse_json_response, truncate_chars};
use crate::llm::Completer;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

const CONTENT_BUDGET_CHARS: usize = 8000;

/// Closed vocabulary of majors taught at the university.
pub const KNOWN_MAJORS: [&str; 11] = [
    "Công nghệ Thông tin",
    "Khoa học Máy tính",
    "Kỹ thuật Phần mềm",
    "Kỹ thuật Máy tính",
    "Hệ thống Thông tin",
    "An toàn Thông tin",
    "Khoa học Dữ liệu",
    "Trí tuệ Nhân tạo",
    "Mạng máy tính và Truyền thông dữ liệu",
    "Thương mại điện tử",
    "Công nghệ Kỹ thuật Điện tử - Truyền thông",
];

/// Closed vocabulary of program names.
pub const KNOWN_PROGRAM_NAMES: [&str; 4] = [
    "Chương trình Chuẩn",
    "Chương trình Tiên tiến",
    "Chương trình Chất lượng cao",
    "Văn bằng 2",
];

/// LLM-assisted metadata generator for curriculum documents.
pub struct CurriculumMetadataGenerator {
    completer: Arc<dyn Completer>,
}

impl CurriculumMetadataGenerator {
    /// Create a generator over a completer.
    #[must_use]
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self { completer }
    }

    fn build_prompt(filename: &str, content: &str) -> String {
        let majors = KNOWN_MAJORS.join("\n- ");
        let programs = KNOWN_PROGRAM_NAMES.join("\n- ");
        format!(
            r#"Bạn là chuyên viên phân tích tài liệu chương trình đào tạo.

**FILENAME:** {filename}

**NỘI DUNG:**
---
{content}
---

**YÊU CẦU:** Trích xuất JSON với format:

{{
    "title": "...",
    "year": 2024,
    "summary": "...",
    "keywords": ["..."],
    "major": "..." hoặc null,
    "major_code": "7480101" hoặc null,
    "program_type": "Chính quy" hoặc "Từ xa" hoặc null,
    "program_name": "..." hoặc null,
    "is_index_page": false
}}

**HƯỚNG DẪN:**

1. **major:** CHỈ chọn từ danh sách sau (đúng chính tả), nếu không khớp → null:
- {majors}

2. **major_code:** Mã ngành của Bộ (VD: 7480101, 7480201), nếu không có → null

3. **program_type:** "Chính quy" hoặc "Từ xa", nếu không rõ → null

4. **program_name:** CHỈ chọn từ danh sách sau, nếu không khớp → null:
- {programs}

5. **year:** Năm áp dụng/khóa tuyển (VD: 2022), nếu không rõ → null

6. **is_index_page:** true nếu là trang danh sách các chương trình

CHỈ TRẢ VỀ JSON, KHÔNG GIẢI THÍCH."#
        )
    }
}

#[async_trait]
impl MetadataGenerator for CurriculumMetadataGenerator {
    async fn generate(&self, filename: &str, content: &str) -> Result<Value> {
        let prompt = Self::build_prompt(filename, truncate_chars(content, CONTENT_BUDGET_CHARS));
        let response = self.completer.complete(&prompt).await?;
        let mut data = parse_json_response(&response)?;

        let obj = data
            .as_object_mut()
            .ok_or_else(|| Error::Remote("metadata response is not a JSON object".to_string()))?;

        // Enforce the closed vocabularies.
        if let Some(major) = obj.get("major").and_then(Value::as_str) {
            if !KNOWN_MAJORS.contains(&major) {
                warn!("Unknown major '{major}', dropping");
                obj.insert("major".to_string(), Value::Null);
            }
        }
        if let Some(name) = obj.get("program_name").and_then(Value::as_str) {
            if !KNOWN_PROGRAM_NAMES.contains(&name) {
                warn!("Unknown program name '{name}', dropping");
                obj.insert("program_name".to_string(), Value::Null);
            }
        }
        if let Some(program_type) = obj.get("program_type").and_then(Value::as_str) {
            if program_type != "Chính quy" && program_type != "Từ xa" {
                warn!("Unknown program type '{program_type}', dropping");
                obj.insert("program_type".to_string(), Value::Null);
            }
        }

        let record: super::CurriculumMetadata = serde_json::from_value(data.clone())
            .map_err(|e| Error::Remote(format!("metadata failed validation: {e}")))?;
        let mut value = serde_json::to_value(record)?;

        // Carry the source filename through for provenance.
        if let Some(obj) = value.as_object_mut() {
            obj.insert("source_file".to_string(), json!(filename));
        }
        Ok(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

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

    #[tokio::test]
    async fn test_valid_metadata_passes() {
        let generator = CurriculumMetadataGenerator::new(Arc::new(StaticCompleter(
            r#"{"title": "CTĐT Khoa học Máy tính 2022", "year": 2022,
                "summary": "…", "keywords": ["KHMT"],
                "major": "Khoa học Máy tính", "major_code": "7480101",
                "program_type": "Chính quy",
                "program_name": "Chương trình Chuẩn",
                "is_index_page": false}"#
                .to_string(),
        )));

        let value = generator
            .generate("cu-nhan-khmt-2022.md", "nội dung")
            .await
            .unwrap();
        assert_eq!(value["major"], "Khoa học Máy tính");
        assert_eq!(value["program_type"], "Chính quy");
        assert_eq!(value["source_file"], "cu-nhan-khmt-2022.md");
    }

    #[tokio::test]
    async fn test_unknown_vocab_values_dropped() {
        let generator = CurriculumMetadataGenerator::new(Arc::new(StaticCompleter(
            r#"{"title": "CTĐT", "year": null, "summary": "…", "keywords": [],
                "major": "Ngành Không Tồn Tại", "major_code": null,
                "program_type": "Vừa học vừa làm",
                "program_name": "Chương trình Lạ",
                "is_index_page": false}"#
                .to_string(),
        )));

        let value = generator.generate("x.md", "nội dung").await.unwrap();
        assert_eq!(value["major"], Value::Null);
        assert_eq!(value["program_type"], Value::Null);
        assert_eq!(value["program_name"], Value::Null);
    }
}
