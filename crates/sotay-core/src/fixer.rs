//! LLM-driven markdown structure repair.
//!
//! The fixer is strictly structural: header levels change, content words do
//! not. The LLM output gets two deterministic post-passes — code-fence
//! stripping and blank-line insertion before tables — because rule-based
//! code is more reliable than the model for those.

use crate::llm::Completer;
use crate::types::Category;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

const REGULATION_PROMPT: &str = r#"Bạn là chuyên gia xử lý văn bản pháp luật của trường đại học.

# NHIỆM VỤ
Sửa lại cấu trúc markdown của văn bản quy định để tuân thủ hierarchy chuẩn.

# HIERARCHY CHUẨN
- CHƯƠNG I, CHƯƠNG II, ... → `#` (Level 1)
- Điều 1, Điều 2, ... → `##` (Level 2)
- Khoản số (1., 2., 3., ...) → `###` (Level 3)
- Khoản chữ cái (a., b., c., ...) → `####` (Level 4)

# QUY TẮC

## 1. Consistency rule
Trong cùng nhóm (cùng Điều), nếu CÓ BẤT KỲ item nào dài (>= 10 từ) thì TẤT CẢ
items cùng level phải là headers. Nếu TẤT CẢ đều ngắn (< 10 từ) thì giữ plain
text, KHÔNG làm header. Scan toàn bộ Điều trước khi quyết định, đếm từ trong
TỪNG khoản.

## 2. Title structure
Nếu title bị tách thành nhiều headers (QUY ĐỊNH / QUYẾT ĐỊNH / THÔNG BÁO ở
dòng đầu và 2-3 dòng mô tả tiếp theo), MERGE TẤT CẢ thành 1 header duy nhất
`#`, VIẾT HOA TOÀN BỘ. Dòng metadata *(Ban hành kèm theo...)* giữ nguyên
italic bên dưới.

## 3. Chapter structure
`# CHƯƠNG I` tách khỏi tên chương → merge thành `# CHƯƠNG I - TÊN CHƯƠNG`
(uppercase).

## 4. Các trường hợp khác
- `**Điều 6.**` in đậm → `## Điều 6.`
- Bảng sau Khoản số → `####`; bảng sau Điều → `###`; bảng standalone → `##`
- Metadata sections (Căn cứ, Xét đề nghị, QUYẾT ĐỊNH) → `##`
- Đoạn văn không số giữa các khoản: giữ nguyên plain text, KHÔNG tự gán số

## 5. Preserve content
- KHÔNG thay đổi nội dung văn bản, numbering, tables
- CHỈ SỬA header levels (`#`, `##`, `###`, `####`)

## 6. Clean up
- Remove empty headers
- Giữ tối đa 1 separator `---` giữa các sections lớn

# INPUT MARKDOWN
```markdown
{markdown}
```

# OUTPUT
Chỉ output markdown đã sửa, KHÔNG giải thích, KHÔNG thêm bất kỳ text nào khác
ngoài markdown. Markdown phải bắt đầu ngay từ dòng đầu tiên."#;

const CURRICULUM_PROMPT: &str = r#"Bạn là chuyên gia xử lý văn bản chương trình đào tạo của trường đại học.

# NHIỆM VỤ
Sửa lại cấu trúc markdown của văn bản chương trình đào tạo để loại bỏ các lỗi
rõ ràng. KHÔNG tự ý tạo hierarchy mới (mỗi khoa có format riêng), CHỈ SỬA
những lỗi cấu trúc RÕ RÀNG, GIỮ NGUYÊN nội dung và numbering.

# CÁC LỖI CẦN SỬA

## 1. Link text đúng ra là header
`[1. TÊN SECTION](url)` → `# 1. TÊN SECTION`. Sections lớn (1, 2, 3) → `#`,
subsections (1.1, 3.2) → `##`, sub-subsections (3.3.1) → `###`.

## 2. Bold text đúng ra là subheader
`**Về XXX:**` hoặc `**Nhóm XXX**` đứng một mình → `### Về XXX` / `### Nhóm XXX`.

## 3. Header levels không nhất quán
Pattern I, II, III hoặc 1.1, 1.2, 1.3 ở các level khác nhau → normalize về
cùng level.

## 4. Bảng có vấn đề về cấu trúc
ĐA SỐ bảng đã đúng format, CHỈ fix nếu thấy lỗi rõ ràng:
- Rows thiếu separators `|` → thêm empty cells cho đủ số cột
- Markdown header (`###`, `##`) xuất hiện GIỮA bảng (sau separator `---|---`)
  → convert thành table row bold với empty cells đủ số cột

## 5. Title bị tách thành nhiều headers
→ merge thành 1 header viết hoa.

## 6. Bullet list characters
En dash `‒` → hyphen `-`.

KHÔNG tự ý thêm blank lines vào bảng - sẽ được xử lý bằng rule-based sau.

# INPUT MARKDOWN
```markdown
{markdown}
```

# OUTPUT
Chỉ output markdown đã sửa, KHÔNG giải thích, KHÔNG thêm bất kỳ text nào khác
ngoài markdown. Markdown phải bắt đầu ngay từ dòng đầu tiên."#;

/// Content-preserving markdown structure repair service.
pub struct MarkdownFixer {
    completer: Arc<dyn Completer>,
    min_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl MarkdownFixer {
    /// Create a fixer over a completer with an RPM budget.
    ///
    /// The RPM limit protects a free-tier model quota; calls sleep before
    /// dispatch until the budget allows another request.
    #[must_use]
    pub fn new(completer: Arc<dyn Completer>, rpm: u32) -> Self {
        let rpm = rpm.max(1);
        Self {
            completer,
            min_delay: Duration::from_secs_f64(60.0 / f64::from(rpm)),
            last_request: Mutex::new(None),
        }
    }

    /// Repair the markdown structure of a document.
    ///
    /// Propagates LLM errors; never silently returns an empty document.
    pub async fn fix(&self, markdown: &str, category: Category) -> Result<String> {
        let template = match category {
            Category::Regulation => REGULATION_PROMPT,
            Category::Curriculum => CURRICULUM_PROMPT,
        };
        let prompt = template.replace("{markdown}", markdown);

        self.rate_limit().await;

        info!(
            "Fixing markdown structure ({} chars) with {}",
            markdown.len(),
            self.completer.model()
        );
        let response = self.completer.complete(&prompt).await?;

        let fixed = strip_code_fence(response.trim());
        if fixed.trim().is_empty() {
            return Err(Error::Remote(
                "markdown fixer produced an empty document".to_string(),
            ));
        }

        Ok(ensure_table_blank_lines(&fixed))
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                let wait = self.min_delay - elapsed;
                debug!("Rate limit: sleeping {:.1}s", wait.as_secs_f64());
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Strip a leading/trailing code fence if the model wrapped its output.
fn strip_code_fence(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }

    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.first().is_some_and(|l| l.starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Ensure a blank line precedes every table header.
///
/// A table header is a line containing `|` whose next line is a separator
/// (`---|---`). No blank line is inserted when the previous line is already
/// blank or itself a separator, which makes the pass idempotent.
#[must_use]
pub fn ensure_table_blank_lines(markdown: &str) -> String {
    let is_separator = |line: &str| {
        !line.trim().is_empty()
            && line.contains('-')
            && line.chars().all(|c| matches!(c, ' ' | '|' | ':' | '-'))
    };

    let lines: Vec<&str> = markdown.split('\n').collect();
    let mut result: Vec<String> = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        let has_pipes = !line.trim().is_empty() && line.contains('|');
        let next_is_separator = lines.get(i + 1).is_some_and(|next| is_separator(next));
        let is_table_header = has_pipes && next_is_separator && !is_separator(line);

        if is_table_header && i > 0 {
            let prev = lines[i - 1];
            if !prev.trim().is_empty() && !is_separator(prev) {
                result.push(String::new());
            }
        }

        result.push((*line).to_string());
    }

    result.join("\n")
}
