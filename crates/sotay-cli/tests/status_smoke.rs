#![allow(missing_docs, clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{sotay_cmd, write_config, write_sidecar};
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn status_on_empty_roots_reports_zero_cost() {
    let tmp = tempdir().unwrap();
    let config = write_config(tmp.path());

    sotay_cmd(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total cost: $0.0000"));
}

#[test]
fn status_lists_documents_with_stage_summary_and_cost() {
    let tmp = tempdir().unwrap();
    let config = write_config(tmp.path());

    write_sidecar(
        tmp.path(),
        "regulation",
        "790-qd-dhcntt",
        r#"{
            "document_id": "790-qd-dhcntt",
            "category": "regulation",
            "source_file": "790-qd-dhcntt.pdf",
            "stages": [
                {
                    "name": "parse",
                    "status": "completed",
                    "timestamp": "2024-10-04T08:00:00+00:00",
                    "input_hash": "0123456789abcdef",
                    "output_file": "01-parsed.md",
                    "cost": 0.05,
                    "manually_edited": false,
                    "metadata": {}
                },
                {
                    "name": "clean",
                    "status": "failed",
                    "timestamp": "2024-10-04T08:01:00+00:00",
                    "metadata": {"error": "boom"}
                }
            ],
            "current_stage": "parse",
            "final_output": "01-parsed.md",
            "migrated_from_legacy": false,
            "metadata": {}
        }"#,
    );

    sotay_cmd(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("790-qd-dhcntt")
                .and(predicate::str::contains("[x] parse"))
                .and(predicate::str::contains("[FAIL] clean"))
                .and(predicate::str::contains("$0.0500"))
                .and(predicate::str::contains("Total cost: $0.0500")),
        );
}

#[test]
fn status_rejects_unknown_category() {
    let tmp = tempdir().unwrap();
    let config = write_config(tmp.path());

    sotay_cmd(&config)
        .args(["status", "--category", "announcement"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized category"));
}
