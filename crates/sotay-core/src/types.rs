//! Core data types shared across the pipeline and retrieval engine.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Document category. Each category owns one vector collection and one
/// chunker variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// University regulations (quy định, quy chế, quyết định).
    Regulation,
    /// Training programs (chương trình đào tạo).
    Curriculum,
}

impl Category {
    /// Canonical lowercase name; doubles as the collection name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regulation => "regulation",
            Self::Curriculum => "curriculum",
        }
    }

    /// All known categories.
    #[must_use]
    pub const fn all() -> [Self; 2] {
        [Self::Regulation, Self::Curriculum]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "regulation" => Ok(Self::Regulation),
            "curriculum" => Ok(Self::Curriculum),
            other => Err(Error::UnknownCategory(other.to_string())),
        }
    }
}

/// Flat scalar metadata map attached to a chunk.
///
/// The vector store only accepts primitive values, so this is the single
/// boundary where typed metadata becomes an untyped map. A `BTreeMap` keeps
/// serialization deterministic, which in turn keeps `chunks.json` byte-stable
/// across reruns.
pub type ChunkMetadata = BTreeMap<String, Value>;

/// A text passage emitted by the chunker; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id derived from document, position, and content.
    pub id: String,
    /// Context header + `\n---\n` + actual content.
    pub text: String,
    /// Flattened scalar metadata.
    pub metadata: ChunkMetadata,
    /// Start offset in the source markdown, when known.
    pub start_char_idx: Option<usize>,
    /// End offset in the source markdown, when known.
    pub end_char_idx: Option<usize>,
    /// Reserved relationship map (kept for sidecar compatibility).
    #[serde(default)]
    pub relationships: Map<String, Value>,
}

/// Flatten arbitrary JSON metadata values to vector-store-safe scalars.
///
/// Lists are joined with `", "`, booleans become strings, nested maps become
/// JSON text, numbers and strings pass through, `null` stays `null`.
#[must_use]
pub fn flatten_metadata_value(value: &Value) -> Value {
    match value {
        Value::Null | Value::String(_) | Value::Number(_) => value.clone(),
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Array(items) => Value::String(
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Value::String(value.to_string()),
    }
}

/// Flatten a whole metadata object into a [`ChunkMetadata`] map.
#[must_use]
pub fn flatten_metadata(metadata: &Map<String, Value>) -> ChunkMetadata {
    metadata
        .iter()
        .map(|(k, v)| (k.clone(), flatten_metadata_value(v)))
        .collect()
}

/// A retrieval candidate with its current score.
///
/// Raw retrieval scores are recall signals only; once the reranker runs, the
/// score field is overwritten with the reranker's output.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredNode {
    /// Chunk id.
    pub id: String,
    /// Owning document id.
    pub document_id: String,
    /// Full chunk text (context header included).
    pub text: String,
    /// Flattened chunk metadata.
    pub metadata: ChunkMetadata,
    /// Current score; raw similarity before rerank, reranker score after.
    pub score: f32,
}

impl ScoredNode {
    /// Look up a metadata value as a string slice.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Look up a metadata value as an integer.
    #[must_use]
    pub fn meta_i64(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(Value::as_i64)
    }
}
