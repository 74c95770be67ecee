//! Local filesystem storage for pipeline artifacts.
//!
//! On-disk layout:
//!
//! ```text
//! {stages_root}/{category}/{document_id}/
//!     .pipeline.json      # state sidecar
//!     01-parsed.md .. 05-fixed.md, 06-flattened.md (optional)
//!     metadata.json
//!     chunks.json
//! {rejected_root}/{category}/{document_id}.md
//! {rejected_root}/{category}/{document_id}.json
//! ```
//!
//! Writes go through a temp file and rename so a crash never leaves a
//! half-written sidecar or artifact behind.

use crate::types::Category;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maximum allowed document id length, matching CLI constraints.
const MAX_DOCUMENT_ID_LEN: usize = 128;

/// Filename of the per-document state sidecar.
pub const STATE_SIDECAR: &str = ".pipeline.json";

/// Local filesystem storage rooted at the stages directory.
#[derive(Debug, Clone)]
pub struct Storage {
    stages_root: PathBuf,
    rejected_root: PathBuf,
}

impl Storage {
    /// Creates a storage instance over explicit roots.
    pub fn new(stages_root: impl Into<PathBuf>, rejected_root: impl Into<PathBuf>) -> Self {
        Self {
            stages_root: stages_root.into(),
            rejected_root: rejected_root.into(),
        }
    }

    /// Returns the stages root directory.
    #[must_use]
    pub fn stages_root(&self) -> &Path {
        &self.stages_root
    }

    /// Returns the rejected-content root directory.
    #[must_use]
    pub fn rejected_root(&self) -> &Path {
        &self.rejected_root
    }

    /// Derive a document id from a source filename.
    ///
    /// Lowercases the stem and replaces anything outside `[a-z0-9_-]` (after
    /// stripping diacritics is NOT attempted; source filenames are already
    /// ASCII slugs) with `-`, collapsing runs.
    #[must_use]
    pub fn document_id_from_filename(filename: &str) -> String {
        let stem = Path::new(filename)
            .file_stem()
            .map_or(filename, |s| s.to_str().unwrap_or(filename));

        let mut id = String::with_capacity(stem.len());
        let mut last_dash = false;
        for c in stem.chars() {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' {
                id.push(c);
                last_dash = false;
            } else if !last_dash {
                id.push('-');
                last_dash = true;
            }
        }
        id.trim_matches('-').to_string()
    }

    /// Validate that a document id is safe to use as a directory name.
    pub fn validate_document_id(document_id: &str) -> Result<()> {
        if document_id.is_empty() {
            return Err(Error::Storage("Document id cannot be empty".into()));
        }

        if document_id.contains("..") || document_id.contains('/') || document_id.contains('\\') {
            return Err(Error::Storage(format!(
                "Invalid document id '{document_id}': contains path traversal characters"
            )));
        }

        if document_id.starts_with('.') || document_id.contains('\0') {
            return Err(Error::Storage(format!(
                "Invalid document id '{document_id}': contains invalid filesystem characters"
            )));
        }

        if document_id.len() > MAX_DOCUMENT_ID_LEN {
            return Err(Error::Storage(format!(
                "Invalid document id '{document_id}': exceeds maximum length of {MAX_DOCUMENT_ID_LEN} characters"
            )));
        }

        if !document_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::Storage(format!(
                "Invalid document id '{document_id}': only [A-Za-z0-9_-] are allowed"
            )));
        }

        Ok(())
    }

    /// Directory owning all artifacts for one document.
    pub fn document_dir(&self, category: Category, document_id: &str) -> Result<PathBuf> {
        Self::validate_document_id(document_id)?;
        Ok(self.stages_root.join(category.as_str()).join(document_id))
    }

    /// Ensures the document directory exists and returns its path.
    pub fn ensure_document_dir(&self, category: Category, document_id: &str) -> Result<PathBuf> {
        let dir = self.document_dir(category, document_id)?;
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("Failed to create document directory: {e}")))?;
        Ok(dir)
    }

    /// Path of the state sidecar for a document.
    pub fn state_path(&self, category: Category, document_id: &str) -> Result<PathBuf> {
        Ok(self.document_dir(category, document_id)?.join(STATE_SIDECAR))
    }

    /// Path of a named artifact inside the document directory.
    pub fn artifact_path(
        &self,
        category: Category,
        document_id: &str,
        filename: &str,
    ) -> Result<PathBuf> {
        Ok(self.document_dir(category, document_id)?.join(filename))
    }

    /// Write an artifact atomically (temp file + rename).
    pub fn write_artifact(
        &self,
        category: Category,
        document_id: &str,
        filename: &str,
        content: &str,
    ) -> Result<PathBuf> {
        self.ensure_document_dir(category, document_id)?;
        let path = self.artifact_path(category, document_id, filename)?;
        write_atomic(&path, content)?;
        debug!("Saved {} for {}/{}", filename, category.as_str(), document_id);
        Ok(path)
    }

    /// Read an artifact as UTF-8 text.
    pub fn read_artifact(
        &self,
        category: Category,
        document_id: &str,
        filename: &str,
    ) -> Result<String> {
        let path = self.artifact_path(category, document_id, filename)?;
        fs::read_to_string(&path)
            .map_err(|e| Error::Storage(format!("Failed to read {filename}: {e}")))
    }

    /// Copy rejected content into the rejected area with its stats sibling.
    pub fn write_rejected(
        &self,
        category: Category,
        document_id: &str,
        content: &str,
        stats_json: &serde_json::Value,
    ) -> Result<PathBuf> {
        let dir = self.rejected_root.join(category.as_str());
        fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("Failed to create rejected directory: {e}")))?;

        let md_path = dir.join(format!("{document_id}.md"));
        write_atomic(&md_path, content)?;

        let json_path = dir.join(format!("{document_id}.json"));
        let json = serde_json::to_string_pretty(stats_json)
            .map_err(|e| Error::Storage(format!("Failed to serialize rejection stats: {e}")))?;
        write_atomic(&json_path, &json)?;

        Ok(md_path)
    }

    /// List document ids under a category, sorted.
    pub fn list_documents(&self, category: Category) -> Result<Vec<String>> {
        let dir = self.stages_root.join(category.as_str());
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let entries = fs::read_dir(&dir)
            .map_err(|e| Error::Storage(format!("Failed to list {}: {e}", dir.display())))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::Storage(format!("Failed to read dir entry: {e}")))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Find every `chunks.json` under the stages root.
    ///
    /// Used to build the BM25 corpus at startup.
    #[must_use]
    pub fn find_chunk_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let Ok(categories) = fs::read_dir(&self.stages_root) else {
            return files;
        };
        for category in categories.flatten() {
            let Ok(documents) = fs::read_dir(category.path()) else {
                continue;
            };
            for document in documents.flatten() {
                let candidate = document.path().join("chunks.json");
                if candidate.is_file() {
                    files.push(candidate);
                }
            }
        }
        files.sort();
        files
    }
}

/// Write content through a temp file and rename into place.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)
        .map_err(|e| Error::Storage(format!("Failed to write {}: {e}", tmp_path.display())))?;

    #[cfg(target_os = "windows")]
    if path.exists() {
        fs::remove_file(path)
            .map_err(|e| Error::Storage(format!("Failed to remove existing file: {e}")))?;
    }

    fs::rename(&tmp_path, path)
        .map_err(|e| Error::Storage(format!("Failed to commit {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("stages"), dir.path().join(".rejected"));
        (dir, storage)
    }

    #[test]
    fn test_document_id_from_filename() {
        assert_eq!(
            Storage::document_id_from_filename("790-qd-dhcntt_28-9-22_quy_che_dao_tao.pdf"),
            "790-qd-dhcntt_28-9-22_quy_che_dao_tao"
        );
        assert_eq!(
            Storage::document_id_from_filename("Some File (final).docx"),
            "some-file-final"
        );
        assert_eq!(Storage::document_id_from_filename("a..b.pdf"), "a-b");
    }

    #[test]
    fn test_validate_document_id_rejects_traversal() {
        assert!(Storage::validate_document_id("../etc").is_err());
        assert!(Storage::validate_document_id("a/b").is_err());
        assert!(Storage::validate_document_id(".hidden").is_err());
        assert!(Storage::validate_document_id("").is_err());
        assert!(Storage::validate_document_id("790-qd-dhcntt").is_ok());
    }

    #[test]
    fn test_write_and_read_artifact() {
        let (_dir, storage) = test_storage();
        storage
            .write_artifact(Category::Regulation, "doc-1", "01-parsed.md", "# Title")
            .unwrap();

        let content = storage
            .read_artifact(Category::Regulation, "doc-1", "01-parsed.md")
            .unwrap();
        assert_eq!(content, "# Title");
    }

    #[test]
    fn test_write_rejected_creates_md_and_json() {
        let (_dir, storage) = test_storage();
        let stats = serde_json::json!({
            "reason": "too_short",
            "score": 0.1,
            "word_count": 4
        });
        let md = storage
            .write_rejected(Category::Curriculum, "nav-page", "link soup", &stats)
            .unwrap();

        assert!(md.exists());
        assert!(md.with_extension("json").exists());
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(md.with_extension("json")).unwrap()).unwrap();
        assert_eq!(json["reason"], "too_short");
    }

    #[test]
    fn test_find_chunk_files_scans_all_categories() {
        let (_dir, storage) = test_storage();
        storage
            .write_artifact(Category::Regulation, "doc-a", "chunks.json", "[]")
            .unwrap();
        storage
            .write_artifact(Category::Curriculum, "doc-b", "chunks.json", "[]")
            .unwrap();
        storage
            .write_artifact(Category::Regulation, "doc-c", "01-parsed.md", "x")
            .unwrap();

        let files = storage.find_chunk_files();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_list_documents_sorted() {
        let (_dir, storage) = test_storage();
        storage
            .ensure_document_dir(Category::Regulation, "zeta")
            .unwrap();
        storage
            .ensure_document_dir(Category::Regulation, "alpha")
            .unwrap();

        let docs = storage.list_documents(Category::Regulation).unwrap();
        assert_eq!(docs, vec!["alpha", "zeta"]);
    }
}
