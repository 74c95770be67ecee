//! Regulation-code lookup table.
//!
//! Maps decision-number prefixes (`828`) to canonical codes so that updates
//! and their base regulations resolve to the same code across documents.
//! Persisted as `regulation_codes.json`; callers serialize updates by
//! holding the table behind one lock.

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Process-wide regulation-code lookup table.
#[derive(Debug)]
pub struct RegulationCodes {
    path: PathBuf,
    codes: BTreeMap<String, String>,
}

impl RegulationCodes {
    /// Load the table from disk, starting fresh when missing or malformed.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let codes = match std::fs::read_to_string(&path) {
            Ok(contents) if !contents.trim().is_empty() => {
                serde_json::from_str(&contents).unwrap_or_else(|e| {
                    warn!("Malformed {}, starting fresh: {e}", path.display());
                    BTreeMap::new()
                })
            },
            _ => BTreeMap::new(),
        };
        Self { path, codes }
    }

    /// Resolve the canonical code for a full code like `828/QĐ-ĐHCNTT`.
    ///
    /// Unknown prefixes are registered as their own canonical form and the
    /// table is persisted immediately.
    pub fn canonical(&mut self, code: &str) -> Result<String> {
        let base_num = code.split('/').next().unwrap_or(code).trim().to_string();
        if base_num.is_empty() {
            return Err(Error::Input(format!("Unusable regulation code: '{code}'")));
        }

        if let Some(existing) = self.codes.get(&base_num) {
            return Ok(existing.clone());
        }

        self.codes.insert(base_num.clone(), base_num.clone());
        self.save()?;
        Ok(base_num)
    }

    /// Number of known codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// True when no codes are registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Storage(format!("Failed to create codes dir: {e}")))?;
            }
        }
        let json = serde_json::to_string_pretty(&self.codes)
            .map_err(|e| Error::Storage(format!("Failed to serialize codes: {e}")))?;
        crate::storage::write_atomic(&self.path, &json)
    }
}
