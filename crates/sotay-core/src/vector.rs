//! Persistent vector store over SQLite with the sqlite-vec extension.
//!
//! One database file holds every collection; rows carry their collection
//! name (= document category) so each category queries independently.
//! Similarity search runs as raw SQL over `vec_distance_cosine`, with
//! embeddings stored as JSON float arrays and converted by `vec_f32` at
//! query time.
//!
//! The store handle is process-wide: open it once and share it across
//! requests. Writes for one document go through delete-then-insert so
//! re-indexing is idempotent.

use crate::types::{Chunk, ChunkMetadata, ScoredNode};
use crate::{Error, Result};
use serde_json::Value;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;
use tokio_rusqlite::{Connection, ffi};
use tracing::{debug, warn};

/// Vector store backed by SQLite + sqlite-vec.
#[derive(Clone)]
pub struct VectorStore {
    conn: Connection,
}

impl VectorStore {
    /// Open (or create) the store at the given database path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        register_sqlite_vec()?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::VectorStore(format!("Failed to create store dir: {e}")))?;
            }
        }

        let conn = Connection::open(path.as_ref())
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        // Fail fast if the extension did not register.
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Error)
        })
        .await
        .map_err(|e| Error::VectorStore(format!("sqlite-vec unavailable: {e}")))?;

        init_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self> {
        register_sqlite_vec()?;
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::VectorStore(e.to_string()))?;
        init_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Delete every chunk of a document from a collection.
    ///
    /// A missing document is fine; re-indexing relies on this being a no-op
    /// for fresh documents.
    pub async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        let collection = collection.to_string();
        let document_id = document_id.to_string();
        let document_id_for_log = document_id.clone();

        let deleted = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM chunks WHERE collection = ?1 AND document_id = ?2",
                    [&collection, &document_id],
                )
                .map_err(tokio_rusqlite::Error::Error)
            })
            .await
            .map_err(|e| Error::VectorStore(format!("delete failed: {e}")))?;

        if deleted > 0 {
            debug!("Deleted {deleted} existing chunks for {document_id_for_log}");
        }
        Ok(deleted)
    }

    /// Insert chunks with their embeddings into a collection.
    pub async fn insert_chunks(
        &self,
        collection: &str,
        document_id: &str,
        chunks: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let collection = collection.to_string();
        let document_id = document_id.to_string();

        let mut rows: Vec<(String, String, String, String)> = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks {
            let metadata = serde_json::to_string(&chunk.metadata)
                .map_err(|e| Error::VectorStore(format!("metadata encode failed: {e}")))?;
            let embedding = serde_json::to_string(&embedding)
                .map_err(|e| Error::VectorStore(format!("embedding encode failed: {e}")))?;
            rows.push((chunk.id, chunk.text, metadata, embedding));
        }

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Error)?;
                {
                    let mut stmt = tx
                        .prepare(
                            "INSERT OR REPLACE INTO chunks
                             (id, collection, document_id, content, metadata, embedding)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        )
                        .map_err(tokio_rusqlite::Error::Error)?;
                    for (id, content, metadata, embedding) in &rows {
                        stmt.execute([
                            id.as_str(),
                            collection.as_str(),
                            document_id.as_str(),
                            content.as_str(),
                            metadata.as_str(),
                            embedding.as_str(),
                        ])
                        .map_err(tokio_rusqlite::Error::Error)?;
                    }
                }
                tx.commit().map_err(tokio_rusqlite::Error::Error)
            })
            .await
            .map_err(|e| Error::VectorStore(format!("insert failed: {e}")))?;

        Ok(())
    }

    /// Cosine-similarity search over one collection.
    ///
    /// Returns nodes with `score = 1 - cosine_distance`, best first.
    pub async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredNode>> {
        let collection = collection.to_string();
        let embedding_json = serde_json::to_string(query_embedding)
            .map_err(|e| Error::VectorStore(e.to_string()))?;

        let rows = self
            .conn
            .call(move |conn| -> std::result::Result<
                Vec<(String, String, String, String, f32)>,
                tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>,
            > {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT id, document_id, content, metadata, \
                         vec_distance_cosine(vec_f32(embedding), vec_f32(?1)) AS distance \
                         FROM chunks \
                         WHERE collection = ?2 \
                         ORDER BY distance ASC \
                         LIMIT {top_k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Error)?;

                let mapped = stmt
                    .query_map([&embedding_json, &collection], |row| {
                        let id: String = row.get(0)?;
                        let document_id: String = row.get(1)?;
                        let content: String = row.get(2)?;
                        let metadata: String = row.get(3)?;
                        let distance: f32 = row.get(4)?;
                        Ok((id, document_id, content, metadata, distance))
                    })
                    .map_err(tokio_rusqlite::Error::Error)?;

                let mut results = Vec::new();
                for row in mapped {
                    results.push(row.map_err(tokio_rusqlite::Error::Error)?);
                }
                Ok(results)
            })
            .await
            .map_err(|e| Error::VectorStore(format!("search failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(id, document_id, content, metadata, distance)| {
                let metadata: ChunkMetadata = serde_json::from_str(&metadata).unwrap_or_else(|e| {
                    warn!("Malformed chunk metadata for {id}: {e}");
                    ChunkMetadata::new()
                });
                ScoredNode {
                    id,
                    document_id,
                    text: content,
                    metadata,
                    score: 1.0 - distance,
                }
            })
            .collect())
    }

    /// Number of chunks in a collection.
    pub async fn count(&self, collection: &str) -> Result<usize> {
        let collection = collection.to_string();
        let count = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
                    [&collection],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(tokio_rusqlite::Error::Error)
            })
            .await
            .map_err(|e| Error::VectorStore(format!("count failed: {e}")))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Distinct document ids stored in a collection.
    pub async fn document_ids(&self, collection: &str) -> Result<Vec<String>> {
        let collection = collection.to_string();
        self.conn
            .call(move |conn| -> std::result::Result<Vec<String>, tokio_rusqlite::Error<tokio_rusqlite::rusqlite::Error>> {
                let mut stmt = conn
                    .prepare(
                        "SELECT DISTINCT document_id FROM chunks \
                         WHERE collection = ?1 ORDER BY document_id",
                    )
                    .map_err(tokio_rusqlite::Error::Error)?;
                let rows = stmt
                    .query_map([&collection], |row| row.get::<_, String>(0))
                    .map_err(tokio_rusqlite::Error::Error)?;
                let mut ids = Vec::new();
                for row in rows {
                    ids.push(row.map_err(tokio_rusqlite::Error::Error)?);
                }
                Ok(ids)
            })
            .await
            .map_err(|e| Error::VectorStore(format!("document listing failed: {e}")))
    }
}

async fn init_schema(conn: &Connection) -> Result<()> {
    conn.call(|conn| {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                 id TEXT PRIMARY KEY,
                 collection TEXT NOT NULL,
                 document_id TEXT NOT NULL,
                 content TEXT NOT NULL,
                 metadata TEXT NOT NULL,
                 embedding TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_chunks_collection
                 ON chunks(collection);
             CREATE INDEX IF NOT EXISTS idx_chunks_document
                 ON chunks(collection, document_id);",
        )
        .map_err(tokio_rusqlite::Error::Error)
    })
    .await
    .map_err(|e| Error::VectorStore(format!("schema init failed: {e}")))
}

/// Register sqlite-vec through the SQLite auto-extension hook.
///
/// Registration is process-wide and must happen before any connection opens,
/// hence the `Once`.
#[allow(unsafe_code)]
fn register_sqlite_vec() -> Result<()> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<std::result::Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                std::mem::transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc == 0 {
                Ok(())
            } else {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            }
        };
        if let Ok(mut guard) = INIT_RESULT.lock() {
            *guard = Some(result);
        }
    });

    INIT_RESULT
        .lock()
        .ok()
        .and_then(|guard| guard.clone())
        .unwrap_or(Err("sqlite-vec init state unavailable".to_string()))
        .map_err(Error::VectorStore)
}

/// Value helper: read a metadata field from a JSON map as a string.
#[must_use]
pub fn metadata_str(metadata: &ChunkMetadata, key: &str) -> Option<String> {
    metadata.get(key).and_then(Value::as_str).map(String::from)
}
