//! In-memory BM25 index over the chunk corpus.
//!
//! Built once at startup by scanning every `chunks.json` under the stages
//! root, then immutable. Lexical scores are recall signals only; the blended
//! retriever hands every candidate to the reranker, which overwrites scores
//! before ranking.

use crate::storage::Storage;
use crate::types::{Chunk, ChunkMetadata, ScoredNode};
use crate::{Error, Result};
use serde_json::Value;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, STORED, STRING, Schema, TEXT, Value as _};
use tantivy::{Index, IndexReader, TantivyDocument, doc};
use tracing::{info, warn};

/// BM25 index over all indexed chunks.
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    id_field: Field,
    document_id_field: Field,
    text_field: Field,
    metadata_field: Field,
    collection_field: Field,
    corpus_size: usize,
}

impl LexicalIndex {
    /// Build the index from every `chunks.json` under the stages root.
    ///
    /// Unreadable chunk files are skipped with a warning so one bad sidecar
    /// cannot take retrieval down.
    pub fn build(storage: &Storage) -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let document_id_field = schema_builder.add_text_field("document_id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT | STORED);
        let metadata_field = schema_builder.add_text_field("metadata", STORED);
        let collection_field = schema_builder.add_text_field("collection", STRING | STORED);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let mut writer = index
            .writer(50_000_000)
            .map_err(|e| Error::Index(format!("Failed to create writer: {e}")))?;

        let mut corpus_size = 0usize;
        for chunk_file in storage.find_chunk_files() {
            let collection = chunk_file
                .parent()
                .and_then(|doc_dir| doc_dir.parent())
                .and_then(|cat_dir| cat_dir.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            let contents = match std::fs::read_to_string(&chunk_file) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Skipping {}: {e}", chunk_file.display());
                    continue;
                },
            };
            let chunks: Vec<Chunk> = match serde_json::from_str(&contents) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Skipping malformed {}: {e}", chunk_file.display());
                    continue;
                },
            };

            for chunk in chunks {
                let document_id = chunk
                    .metadata
                    .get("document_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let metadata_json = serde_json::to_string(&chunk.metadata).unwrap_or_default();

                writer
                    .add_document(doc!(
                        id_field => chunk.id.as_str(),
                        document_id_field => document_id.as_str(),
                        text_field => chunk.text.as_str(),
                        metadata_field => metadata_json.as_str(),
                        collection_field => collection.as_str(),
                    ))
                    .map_err(|e| Error::Index(format!("Failed to add document: {e}")))?;
                corpus_size += 1;
            }
        }

        writer
            .commit()
            .map_err(|e| Error::Index(format!("Failed to commit: {e}")))?;

        let reader = index
            .reader()
            .map_err(|e| Error::Index(format!("Failed to create reader: {e}")))?;

        info!("BM25 corpus built with {corpus_size} chunks");

        Ok(Self {
            index,
            reader,
            id_field,
            document_id_field,
            text_field,
            metadata_field,
            collection_field,
            corpus_size,
        })
    }

    /// Number of chunks in the corpus.
    #[must_use]
    pub const fn corpus_size(&self) -> usize {
        self.corpus_size
    }

    /// BM25 search within one collection.
    pub fn search(&self, query: &str, collection: &str, limit: usize) -> Result<Vec<ScoredNode>> {
        if self.corpus_size == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let (parsed, errors) = parser.parse_query_lenient(query);
        if !errors.is_empty() {
            warn!("Lenient BM25 parse for '{query}': {} issues", errors.len());
        }

        // Over-fetch, then filter by collection; cheap at corpus scale.
        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit.max(1) * 4))
            .map_err(|e| Error::Index(format!("Search failed: {e}")))?;

        let mut results = Vec::new();
        for (score, address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| Error::Index(format!("Doc fetch failed: {e}")))?;

            let field_str = |field: Field| {
                retrieved
                    .get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };

            if field_str(self.collection_field) != collection {
                continue;
            }

            let metadata: ChunkMetadata =
                serde_json::from_str(&field_str(self.metadata_field)).unwrap_or_default();

            results.push(ScoredNode {
                id: field_str(self.id_field),
                document_id: field_str(self.document_id_field),
                text: field_str(self.text_field),
                metadata,
                score,
            });
            if results.len() >= limit {
                break;
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Category;
    use serde_json::json;

    fn write_chunks(storage: &Storage, category: Category, document_id: &str, texts: &[&str]) {
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let mut metadata = ChunkMetadata::new();
                metadata.insert("document_id".to_string(), json!(document_id));
                Chunk {
                    id: format!("{document_id}-{i}"),
                    text: (*text).to_string(),
                    metadata,
                    start_char_idx: None,
                    end_char_idx: None,
                    relationships: serde_json::Map::new(),
                }
            })
            .collect();
        storage
            .write_artifact(
                category,
                document_id,
                "chunks.json",
                &serde_json::to_string(&chunks).unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn test_build_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("stages"), dir.path().join(".rejected"));

        write_chunks(
            &storage,
            Category::Regulation,
            "doc-reg",
            &[
                "Điều 15. Điều kiện tốt nghiệp của sinh viên hệ chính quy",
                "Điều 3. Quy định về học phí và miễn giảm",
            ],
        );
        write_chunks(
            &storage,
            Category::Curriculum,
            "doc-cur",
            &["Danh sách môn học ngành Khoa học Máy tính"],
        );

        let index = LexicalIndex::build(&storage).unwrap();
        assert_eq!(index.corpus_size(), 3);

        let hits = index.search("tốt nghiệp", "regulation", 5).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].document_id, "doc-reg");
        assert!(hits[0].text.contains("tốt nghiệp"));

        // Collection filter keeps curriculum chunks out.
        assert!(hits.iter().all(|h| h.document_id == "doc-reg"));
    }

    #[test]
    fn test_empty_corpus_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("stages"), dir.path().join(".rejected"));

        let index = LexicalIndex::build(&storage).unwrap();
        assert_eq!(index.corpus_size(), 0);
        assert!(index.search("anything", "regulation", 5).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_chunks_file_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("stages"), dir.path().join(".rejected"));
        storage
            .write_artifact(Category::Regulation, "bad", "chunks.json", "{broken")
            .unwrap();
        write_chunks(&storage, Category::Regulation, "good", &["nội dung hợp lệ"]);

        let index = LexicalIndex::build(&storage).unwrap();
        assert_eq!(index.corpus_size(), 1);
    }
}
