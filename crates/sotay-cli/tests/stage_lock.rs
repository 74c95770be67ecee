#![allow(missing_docs, clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{sotay_cmd, write_config, write_sidecar};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

const SIDECAR: &str = r#"{
    "document_id": "790-qd-dhcntt",
    "category": "regulation",
    "source_file": "790-qd-dhcntt.pdf",
    "stages": [
        {
            "name": "fix-markdown",
            "status": "completed",
            "timestamp": "2024-10-04T08:00:00+00:00",
            "input_hash": "0123456789abcdef",
            "output_file": "05-fixed.md",
            "cost": 0.0,
            "manually_edited": false,
            "metadata": {}
        }
    ],
    "current_stage": "fix-markdown",
    "final_output": "05-fixed.md",
    "migrated_from_legacy": false,
    "metadata": {}
}"#;

fn manually_edited(sidecar_path: &std::path::Path) -> bool {
    let state: Value =
        serde_json::from_str(&std::fs::read_to_string(sidecar_path).unwrap()).unwrap();
    state["stages"][0]["manually_edited"].as_bool().unwrap()
}

#[test]
fn lock_and_unlock_roundtrip_through_the_sidecar() {
    let tmp = tempdir().unwrap();
    let config = write_config(tmp.path());
    let sidecar = write_sidecar(tmp.path(), "regulation", "790-qd-dhcntt", SIDECAR);

    sotay_cmd(&config)
        .args(["stage", "lock", "regulation", "790-qd-dhcntt", "fix-markdown"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Locked"));
    assert!(manually_edited(&sidecar));

    sotay_cmd(&config)
        .args(["stage", "unlock", "regulation", "790-qd-dhcntt", "fix-markdown"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unlocked"));
    assert!(!manually_edited(&sidecar));
}

#[test]
fn lock_fails_without_a_stage_record() {
    let tmp = tempdir().unwrap();
    let config = write_config(tmp.path());
    write_sidecar(tmp.path(), "regulation", "790-qd-dhcntt", SIDECAR);

    sotay_cmd(&config)
        .args(["stage", "lock", "regulation", "790-qd-dhcntt", "metadata"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no record"));
}
