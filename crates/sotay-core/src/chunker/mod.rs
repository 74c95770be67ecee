//! Structure-aware chunking for regulation and curriculum markdown.
//!
//! Both category variants share one engine:
//!
//! 1. **Preprocess** — drop empty headers, demote false-header bullets.
//! 2. **Parse by headers** — walk lines with a header stack; the regulation
//!    variant also recognizes implicit `CHƯƠNG`/`Điều` section markers in
//!    plain text and treats them as level-2 headers.
//! 3. **Truncate headers** for hierarchy display (regulation patterns map to
//!    `Điều N` / `CHƯƠNG X` / `Khoản N` / `Mục a`; curriculum keeps headers
//!    verbatim up to 80 chars).
//! 4. **Title merge** (regulation only) — collapse a run of short leading
//!    chunks into one title chunk.
//! 5. **Prepend context** — document and section fields, separated from the
//!    content by `\n---\n`. This combined text is what the vector store sees.
//! 6. **Token check & sub-chunk** — chunks over `max_tokens` are split with a
//!    sentence-aware splitter; the context header is prepended to every
//!    sub-chunk.

mod curriculum;
mod regulation;
mod sentence;

pub use sentence::SentenceSplitter;

use crate::state::content_hash;
use crate::types::{Category, Chunk, ChunkMetadata};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tiktoken_rs::CoreBPE;

/// Separator between the prepended context header and the chunk content.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Header text assigned to a merged title chunk with no usable headers.
pub const TITLE_HEADER: &str = "TITLE";

const HEADER_TRUNCATE_LEN: usize = 80;

/// Chunker tuning knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Maximum tokens per chunk before sub-chunking.
    pub max_tokens: usize,
    /// Target token size for sub-chunks.
    pub sub_chunk_size: usize,
    /// Token overlap between consecutive sub-chunks.
    pub sub_chunk_overlap: usize,
    /// Deepest header level treated as a chunk boundary.
    pub max_header_level: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            sub_chunk_size: 1024,
            sub_chunk_overlap: 200,
            max_header_level: 4,
        }
    }
}

/// Statistics from one chunking run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SplitterStats {
    /// Chunks produced by header parsing, before sub-chunking.
    pub total_chunks: usize,
    /// Chunks that exceeded `max_tokens` and were sub-chunked.
    pub large_chunks_split: usize,
    /// Final emitted chunk count.
    pub final_nodes: usize,
    /// Leading chunks merged into a title chunk (regulation only).
    pub title_chunks_merged: usize,
    /// Implicit section markers promoted to headers (regulation only).
    pub patterns_detected: usize,
}

/// Output of one chunking run.
#[derive(Debug)]
pub struct ChunkOutput {
    /// Emitted chunks in document order.
    pub chunks: Vec<Chunk>,
    /// Run statistics.
    pub stats: SplitterStats,
}

/// One header-delimited span of the source markdown.
#[derive(Debug, Clone)]
struct RawChunk {
    text: String,
    header_path: Vec<String>,
    current_header: Option<String>,
    level: usize,
    start_char_idx: Option<usize>,
    end_char_idx: Option<usize>,
}

/// Structure-aware chunker for one document category.
pub struct Chunker {
    category: Category,
    config: SplitterConfig,
    bpe: CoreBPE,
    sentence_splitter: SentenceSplitter,
}

impl Chunker {
    /// Create a chunker for the given category.
    pub fn new(category: Category, config: SplitterConfig) -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| Error::Other(format!("Failed to load cl100k_base encoding: {e}")))?;
        Ok(Self {
            category,
            sentence_splitter: SentenceSplitter::new(
                config.sub_chunk_size,
                config.sub_chunk_overlap,
            ),
            config,
            bpe,
        })
    }

    /// Count BPE tokens in a text.
    #[must_use]
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Name recorded as `splitter_type` in chunk metadata.
    #[must_use]
    pub const fn splitter_type(&self) -> &'static str {
        match self.category {
            Category::Regulation => "RegulationSplitter",
            Category::Curriculum => "CurriculumSplitter",
        }
    }

    /// Chunk a document into retrieval units.
    ///
    /// `metadata` is the flattened document metadata; `category` and
    /// `document_id` must already be stamped by the caller.
    pub fn chunk_document(&self, text: &str, metadata: &ChunkMetadata) -> Result<ChunkOutput> {
        let mut stats = SplitterStats::default();

        let cleaned = preprocess_markdown(text);
        let mut raw_chunks = self.parse_by_headers(&cleaned, &mut stats);
        stats.total_chunks = raw_chunks.len();

        if self.category == Category::Regulation {
            raw_chunks = regulation::merge_title_chunks(raw_chunks, &mut stats);
        }

        let document_id = metadata
            .get("document_id")
            .and_then(Value::as_str)
            .unwrap_or("");

        let mut chunks = Vec::new();
        for (chunk_index, raw) in raw_chunks.iter().enumerate() {
            let context = self.build_context_header(raw, metadata);
            let full_text = if context.is_empty() {
                raw.text.clone()
            } else {
                format!("{context}{CONTEXT_SEPARATOR}{}", raw.text)
            };

            let token_count = self.count_tokens(&full_text);
            let hierarchy = hierarchy_string(raw);

            if token_count <= self.config.max_tokens {
                chunks.push(self.emit_chunk(
                    document_id,
                    metadata,
                    raw,
                    full_text,
                    &hierarchy,
                    chunk_index,
                    token_count,
                    None,
                ));
            } else {
                stats.large_chunks_split += 1;
                tracing::debug!(
                    "Chunk {chunk_index}: {token_count} tokens > {}, sub-chunking",
                    self.config.max_tokens
                );

                let (context_prefix, content) = match full_text.split_once(CONTEXT_SEPARATOR) {
                    Some((ctx, body)) => (format!("{ctx}{CONTEXT_SEPARATOR}"), body.to_string()),
                    None => (String::new(), full_text.clone()),
                };

                let sub_texts = self
                    .sentence_splitter
                    .split(content.trim(), &|t| self.count_tokens(t));
                let total_sub_chunks = sub_texts.len();

                for (sub_idx, sub_text) in sub_texts.into_iter().enumerate() {
                    let sub_full = format!("{context_prefix}\n{sub_text}");
                    chunks.push(self.emit_chunk(
                        document_id,
                        metadata,
                        raw,
                        sub_full,
                        &hierarchy,
                        chunk_index,
                        token_count,
                        Some((sub_idx, total_sub_chunks)),
                    ));
                }
            }
        }

        stats.final_nodes = chunks.len();
        Ok(ChunkOutput { chunks, stats })
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_chunk(
        &self,
        document_id: &str,
        metadata: &ChunkMetadata,
        raw: &RawChunk,
        text: String,
        hierarchy: &str,
        chunk_index: usize,
        parent_tokens: usize,
        sub: Option<(usize, usize)>,
    ) -> Chunk {
        let mut meta: ChunkMetadata = metadata.clone();
        meta.insert("chunk_index".to_string(), json!(chunk_index));
        meta.insert(
            "current_header".to_string(),
            raw.current_header.as_deref().map_or(Value::Null, Value::from),
        );
        meta.insert("hierarchy".to_string(), json!(hierarchy));
        meta.insert("header_level".to_string(), json!(raw.level));
        meta.insert("splitter_type".to_string(), json!(self.splitter_type()));

        let (id_suffix, start, end) = match sub {
            Some((sub_idx, total)) => {
                meta.insert("is_sub_chunked".to_string(), json!("true"));
                meta.insert("sub_chunk_index".to_string(), json!(sub_idx));
                meta.insert("total_sub_chunks".to_string(), json!(total));
                meta.insert("parent_chunk_tokens".to_string(), json!(parent_tokens));
                meta.insert("token_count".to_string(), json!(self.count_tokens(&text)));
                (format!("{sub_idx}"), None, None)
            },
            None => {
                meta.insert("is_sub_chunked".to_string(), json!("false"));
                meta.insert("token_count".to_string(), json!(parent_tokens));
                ("-".to_string(), raw.start_char_idx, raw.end_char_idx)
            },
        };

        let id = chunk_id(document_id, chunk_index, &id_suffix, &text);

        Chunk {
            id,
            text,
            metadata: meta,
            start_char_idx: start,
            end_char_idx: end,
            relationships: Map::new(),
        }
    }

    /// Walk lines maintaining a header stack, closing a chunk at every header
    /// boundary (explicit markdown header or, for regulation, an implicit
    /// section marker).
    fn parse_by_headers(&self, text: &str, stats: &mut SplitterStats) -> Vec<RawChunk> {
        let header_re = header_regex();
        let mut chunks: Vec<RawChunk> = Vec::new();
        let mut stack: Vec<(usize, String)> = Vec::new();
        let mut current_lines: Vec<&str> = Vec::new();
        let mut chunk_start = 0usize;
        let mut offset = 0usize;

        for line in text.split('\n') {
            let line_start = offset;
            offset += line.chars().count() + 1;

            if let Some(caps) = header_re.captures(line) {
                let level = caps[1].len();
                let header_text = caps[2].trim();

                // Headers deeper than the cutoff stay inside the chunk.
                if level > self.config.max_header_level {
                    current_lines.push(line);
                    continue;
                }

                close_raw_chunk(&mut chunks, &mut current_lines, &stack, chunk_start, line_start);

                stack.retain(|(l, _)| *l < level);
                stack.push((level, self.truncate_header(header_text)));

                current_lines.push(line);
                chunk_start = line_start;
                continue;
            }

            if self.category == Category::Regulation && regulation::is_section_marker(line) {
                close_raw_chunk(&mut chunks, &mut current_lines, &stack, chunk_start, line_start);

                // Implicit markers slot in as level-2 headers.
                let level = 2;
                stack.retain(|(l, _)| *l < level);
                stack.push((level, self.truncate_header(line.trim())));

                stats.patterns_detected += 1;
                current_lines.push(line);
                chunk_start = line_start;
                continue;
            }

            if current_lines.is_empty() {
                chunk_start = line_start;
            }
            current_lines.push(line);
        }

        close_raw_chunk(&mut chunks, &mut current_lines, &stack, chunk_start, offset);
        chunks
    }

    fn truncate_header(&self, header: &str) -> String {
        match self.category {
            Category::Regulation => regulation::truncate_header(header, HEADER_TRUNCATE_LEN),
            Category::Curriculum => curriculum::truncate_header(header, HEADER_TRUNCATE_LEN),
        }
    }

    /// Build the context block prepended to a chunk.
    fn build_context_header(&self, raw: &RawChunk, metadata: &ChunkMetadata) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(doc_id) = metadata.get("document_id").and_then(Value::as_str) {
            if !doc_id.is_empty() {
                parts.push(format!("Tài liệu: {}", display_document_id(doc_id)));
            }
        }

        if let Some(title) = metadata.get("title").and_then(Value::as_str) {
            if !title.is_empty() {
                parts.push(format!("Tiêu đề: {title}"));
            }
        }

        if let Some(header) = raw.current_header.as_deref() {
            if header != TITLE_HEADER {
                parts.push(format!("Phần: {header}"));
            }
        }

        match self.category {
            Category::Regulation => {
                if let Some(date) = metadata.get("effective_date").and_then(Value::as_str) {
                    parts.push(format!("Ngày hiệu lực: {date}"));
                }
                if let Some(doc_type) = metadata.get("document_type").and_then(Value::as_str) {
                    let label = match doc_type {
                        "original" => "Văn bản gốc",
                        "update" => "Văn bản sửa đổi",
                        "supplement" => "Văn bản bổ sung",
                        "replacement" => "Văn bản thay thế",
                        other => other,
                    };
                    parts.push(format!("Loại: {label}"));
                }
            },
            Category::Curriculum => {
                if let Some(major) = metadata.get("major").and_then(Value::as_str) {
                    parts.push(format!("Ngành: {major}"));
                }
                if let Some(year) = metadata.get("year") {
                    if !year.is_null() {
                        let rendered = year.as_i64().map_or_else(
                            || year.as_str().unwrap_or_default().to_string(),
                            |y| y.to_string(),
                        );
                        if !rendered.is_empty() {
                            parts.push(format!("Năm: {rendered}"));
                        }
                    }
                }
                if let Some(program_type) = metadata.get("program_type").and_then(Value::as_str) {
                    parts.push(format!("Hệ: {program_type}"));
                }
                if let Some(program_name) = metadata.get("program_name").and_then(Value::as_str) {
                    parts.push(format!("Chương trình: {program_name}"));
                }
            },
        }

        parts.join("\n")
    }
}

/// Close the accumulating chunk, attributing it to the current stack top.
fn close_raw_chunk(
    chunks: &mut Vec<RawChunk>,
    current_lines: &mut Vec<&str>,
    stack: &[(usize, String)],
    start: usize,
    end: usize,
) {
    if current_lines.is_empty() {
        return;
    }
    let (parents, current, level) = stack_view(stack);
    chunks.push(RawChunk {
        text: current_lines.join("\n"),
        header_path: parents,
        current_header: current,
        level,
        start_char_idx: Some(start),
        end_char_idx: Some(end),
    });
    current_lines.clear();
}

/// `A > B > C` hierarchy string: parents plus the chunk's own header.
fn hierarchy_string(raw: &RawChunk) -> String {
    let mut full = raw.header_path.clone();
    if let Some(current) = &raw.current_header {
        full.push(current.clone());
    }
    full.join(" > ")
}

fn stack_view(stack: &[(usize, String)]) -> (Vec<String>, Option<String>, usize) {
    match stack.split_last() {
        Some(((level, current), parents)) => (
            parents.iter().map(|(_, t)| t.clone()).collect(),
            Some(current.clone()),
            *level,
        ),
        None => (Vec::new(), None, 0),
    }
}

fn header_regex() -> &'static regex::Regex {
    static RE: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    RE.get_or_init(|| regex::Regex::new(r"^(#{1,6})\s+(.+)").unwrap_or_else(|_| unreachable!()))
}

/// Cleanup pass before header parsing: remove empty headers and demote
/// bullet points that were mis-marked as headers (`#### - text` → `- text`).
/// Horizontal rules are kept as content.
fn preprocess_markdown(text: &str) -> String {
    static EMPTY_HEADER: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    static BULLET_HEADER: once_cell::sync::OnceCell<regex::Regex> =
        once_cell::sync::OnceCell::new();

    let empty_header = EMPTY_HEADER
        .get_or_init(|| regex::Regex::new(r"^#{1,6}\s*$").unwrap_or_else(|_| unreachable!()));
    let bullet_header = BULLET_HEADER.get_or_init(|| {
        regex::Regex::new(r"^#{1,6}\s*([-*])\s+(.+)").unwrap_or_else(|_| unreachable!())
    });

    let mut cleaned: Vec<String> = Vec::new();
    for line in text.split('\n') {
        if empty_header.is_match(line) {
            continue;
        }
        if let Some(caps) = bullet_header.captures(line) {
            cleaned.push(format!("{} {}", &caps[1], &caps[2]));
            continue;
        }
        cleaned.push(line.to_string());
    }
    cleaned.join("\n")
}

/// Human display form of a document id: strip `.md`, dashes to spaces,
/// ASCII title case.
fn display_document_id(document_id: &str) -> String {
    let stem = document_id.strip_suffix(".md").unwrap_or(document_id);
    stem.replace('-', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable chunk id from document, position, and content.
fn chunk_id(document_id: &str, chunk_index: usize, sub: &str, text: &str) -> String {
    content_hash(&format!("{document_id}:{chunk_index}:{sub}:{text}"))
}
