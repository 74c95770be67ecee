//! `sotay pipeline` - processing then indexing in one shot.

use anyhow::{Context, Result};
use sotay_core::Storage;

use std::path::Path;

pub async fn execute(
    config: &sotay_core::Config,
    file: &Path,
    category: &str,
    document_id: Option<String>,
    force: bool,
) -> Result<()> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("source file has no usable name")?;
    let resolved_id =
        document_id.unwrap_or_else(|| Storage::document_id_from_filename(filename));

    super::process::execute(config, file, category, Some(resolved_id.clone()), force).await?;
    super::index::execute(config, &resolved_id, category, force).await
}
