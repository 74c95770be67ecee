//! Metadata extraction for regulation documents.
//!
//! The LLM extracts everything in one call, but the filename wins wherever
//! it is authoritative: for `original` documents the decision code comes
//! from the filename pattern (`828_qd-dhcntt…` → `828/QĐ-DHCNTT`), and a
//! `DD-MM-YYYY` filename date overrides whatever the model read out of the
//! body. For `update` documents the code comes from the matching entry of
//! the document's "Căn cứ" section, which only the model can resolve.

use super::codes::RegulationCodes;
use super::{MetadataGenerator, parse_json_response, truncate_chars};
use crate::llm::Completer;
use crate::{Error, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const CONTENT_BUDGET_CHARS: usize = 8000;

/// Filename code after a `__` prefix (`05-quy-dinh__828_qd-dhcntt_…`).
static FILE_CODE_PREFIXED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)__(\d+)[-_]([a-z]+)-(\p{L}+(?:-\p{L}+)?)").unwrap_or_else(|_| unreachable!())
});

/// Filename code at the start (`828_qd-dhcntt_…`).
static FILE_CODE_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d+)[-_]([a-z]+)-(\p{L}+(?:-\p{L}+)?)").unwrap_or_else(|_| unreachable!())
});

/// Filename date `DD-MM-YYYY`, separator-tolerant.
static FILE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-_]?(\d{1,2})-(\d{1,2})-(\d{4})(?:_|$)").unwrap_or_else(|_| unreachable!())
});

/// Content date `ngày DD tháng MM năm YYYY`.
static CONTENT_DATE_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ngày\s+(\d{1,2})\s+tháng\s+(\d{1,2})\s+năm\s+(\d{4})")
        .unwrap_or_else(|_| unreachable!())
});

/// Content date `DD/MM/YYYY`.
static CONTENT_DATE_SLASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap_or_else(|_| unreachable!()));

/// Extract a regulation code from a filename stem.
///
/// `828_qd-dhcntt_04-10-2022_…` → `828/QD-DHCNTT`.
#[must_use]
pub fn code_from_filename(stem: &str) -> Option<String> {
    let caps = FILE_CODE_PREFIXED
        .captures(stem)
        .or_else(|| (!stem.contains("__")).then(|| FILE_CODE_BARE.captures(stem)).flatten())?;

    Some(format!(
        "{}/{}-{}",
        &caps[1],
        caps[2].to_uppercase(),
        caps[3].to_uppercase()
    ))
}

/// Extract an ISO date from a filename stem (`…_4-10-2022_…` → `2022-10-04`).
#[must_use]
pub fn date_from_filename(stem: &str) -> Option<String> {
    let caps = FILE_DATE.captures(stem)?;
    Some(format!("{}-{:0>2}-{:0>2}", &caps[3], &caps[2], &caps[1]))
}

/// Extract an ISO date from the document body.
#[must_use]
pub fn date_from_content(content: &str) -> Option<String> {
    if let Some(caps) = CONTENT_DATE_WORDS.captures(content) {
        return Some(format!("{}-{:0>2}-{:0>2}", &caps[3], &caps[2], &caps[1]));
    }
    if let Some(caps) = CONTENT_DATE_SLASH.captures(content) {
        return Some(format!("{}-{:0>2}-{:0>2}", &caps[3], &caps[2], &caps[1]));
    }
    None
}

/// LLM-assisted metadata generator for regulation documents.
pub struct RegulationMetadataGenerator {
    completer: Arc<dyn Completer>,
    codes: Arc<Mutex<RegulationCodes>>,
}

impl RegulationMetadataGenerator {
    /// Create a generator over a completer and the shared code table.
    #[must_use]
    pub fn new(completer: Arc<dyn Completer>, codes: Arc<Mutex<RegulationCodes>>) -> Self {
        Self { completer, codes }
    }

    fn build_prompt(filename: &str, content: &str) -> String {
        format!(
            r#"Bạn là chuyên viên phân tích văn bản pháp lý.

**FILENAME:** {filename}

**NỘI DUNG VĂN BẢN:**
---
{content}
---

**YÊU CẦU:** Trích xuất JSON với format:

{{
    "title": "...",
    "year": 2024,
    "summary": "...",
    "keywords": ["..."],
    "document_type": "original" hoặc "update",
    "effective_date": "2024-01-01",
    "is_index_page": false,
    "base_regulation_code": "828/QĐ-ĐHCNTT" hoặc null
}}

**HƯỚNG DẪN:**

1. **document_type:**
   - "original": Văn bản ban hành MỚI, quy định lần đầu
   - "update": Văn bản SỬA ĐỔI/BỔ SUNG văn bản khác

2. **base_regulation_code:**

   Nếu document_type = "original":
   - KHÔNG tìm trong phần "Căn cứ" (đó là các văn bản khác)
   - CHỈ lấy số hiệu của CHÍNH VĂN BẢN NÀY (dòng "Số: XXX/QĐ-YYY" ở đầu,
     hoặc từ FILENAME)

   Nếu document_type = "update":
   - Xác định CHỦ ĐỀ của văn bản này
   - Đọc phần "CĂN CỨ" và chọn quyết định có chủ đề GẦN GIỐNG NHẤT
   - Trích xuất số hiệu từ dòng đó (VD: "828/QĐ-ĐHCNTT")
   - Nếu không tìm thấy văn bản tương tự → null

3. **is_index_page:** true nếu là trang danh sách, false nếu là văn bản chi tiết

CHỈ TRẢ VỀ JSON, KHÔNG GIẢI THÍCH."#
        )
    }
}

#[async_trait]
impl MetadataGenerator for RegulationMetadataGenerator {
    async fn generate(&self, filename: &str, content: &str) -> Result<Value> {
        let stem = std::path::Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename);

        let prompt = Self::build_prompt(filename, truncate_chars(content, CONTENT_BUDGET_CHARS));
        let response = self.completer.complete(&prompt).await?;
        let mut data = parse_json_response(&response)?;

        let obj = data
            .as_object_mut()
            .ok_or_else(|| Error::Remote("metadata response is not a JSON object".to_string()))?;

        // Fold "supplement" into "update".
        if obj.get("document_type").and_then(Value::as_str) == Some("supplement") {
            obj.insert("document_type".to_string(), json!("update"));
        }

        let mut llm_code = obj
            .get("base_regulation_code")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty() && !matches!(c.to_lowercase().as_str(), "null" | "none" | "n/a"))
            .map(String::from);

        if let Some(code) = &llm_code {
            if !code.contains('/') {
                warn!("Invalid base_regulation_code format '{code}', using filename fallback");
                llm_code = None;
            }
        }

        let filename_code = code_from_filename(stem);
        let is_original = obj.get("document_type").and_then(Value::as_str) == Some("original");

        // Originals always trust the filename; the model confuses the
        // document's own number with the ones it cites.
        let chosen_code = if is_original && filename_code.is_some() {
            debug!("Original document: using filename code {filename_code:?}");
            filename_code
        } else {
            llm_code.or(filename_code)
        };

        if let Some(date) = date_from_filename(stem) {
            if let Some(year) = date.split('-').next().and_then(|y| y.parse::<i64>().ok()) {
                obj.insert("year".to_string(), json!(year));
            }
            obj.insert("effective_date".to_string(), json!(date));
        } else if obj.get("effective_date").and_then(Value::as_str).is_none() {
            if let Some(date) = date_from_content(content) {
                obj.insert("effective_date".to_string(), json!(date));
            }
        }

        match chosen_code {
            Some(code) => {
                let canonical = {
                    let mut codes = self.codes.lock().await;
                    codes.canonical(&code)?
                };
                obj.insert("regulation_number".to_string(), json!(canonical.clone()));
                obj.insert("base_regulation_code".to_string(), json!(canonical));
            },
            None => {
                obj.insert("regulation_number".to_string(), Value::Null);
                obj.insert("base_regulation_code".to_string(), Value::Null);
            },
        }

        // Validate through the typed record before handing it back.
        let record: super::RegulationMetadata = serde_json::from_value(data.clone())
            .map_err(|e| Error::Remote(format!("metadata failed validation: {e}")))?;
        serde_json::to_value(record).map_err(Into::into)
    }
}
