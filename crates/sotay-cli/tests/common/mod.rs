#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Write a config file pointing every path into `root` and return its path.
#[allow(dead_code)]
pub fn write_config(root: &Path) -> PathBuf {
    let config = format!(
        "[paths]\n\
         stages_root = \"{}\"\n\
         rejected_root = \"{}\"\n\
         vector_store_path = \"{}\"\n\
         regulation_codes_path = \"{}\"\n",
        root.join("stages").display(),
        root.join(".rejected").display(),
        root.join("vector/sotay.db").display(),
        root.join("regulation_codes.json").display(),
    );
    let path = root.join("config.toml");
    std::fs::write(&path, config).expect("failed to write test config");
    path
}

/// Create a configured `sotay` command suitable for integration tests.
#[allow(dead_code)]
pub fn sotay_cmd(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("sotay"));
    cmd.timeout(CMD_TIMEOUT);
    cmd.env("NO_COLOR", "1");
    cmd.arg("--config").arg(config);
    cmd
}

/// Write a minimal state sidecar for a document and return its path.
#[allow(dead_code)]
pub fn write_sidecar(root: &Path, category: &str, document_id: &str, sidecar: &str) -> PathBuf {
    let doc_dir = root.join("stages").join(category).join(document_id);
    std::fs::create_dir_all(&doc_dir).expect("failed to create document dir");
    let path = doc_dir.join(".pipeline.json");
    std::fs::write(&path, sidecar).expect("failed to write sidecar");
    path
}
