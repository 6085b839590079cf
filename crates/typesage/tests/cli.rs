use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;
use testing::fixtures::{FREE_VARIABLE, MALFORMED, write_fixture};

fn typesage(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("typesage").expect("cargo bin typesage");
    cmd.env("HOME", data_dir)
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

fn json_output(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run typesage");
    assert!(
        output.status.success(),
        "typesage failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn analyze_offline_then_hit_cache() {
    let dir = TempDir::new().expect("temp dir");
    let file = write_fixture(dir.path(), "snippet.py", FREE_VARIABLE).expect("fixture");

    let first = json_output(typesage(dir.path()).arg("analyze").arg(&file).arg("--offline"));
    assert_eq!(first["success"], true);
    assert_eq!(first["cached"], false);
    assert_eq!(first["unresolved"][0]["name"], "b");
    assert_eq!(first["unresolved"][0]["use_line"], 2);

    let second = json_output(typesage(dir.path()).arg("analyze").arg(&file).arg("--offline"));
    assert_eq!(second["cached"], true);
    assert_eq!(second["fingerprint"], first["fingerprint"]);

    let stats = json_output(typesage(dir.path()).args(["cache", "stats"]));
    assert_eq!(stats["analysis_results"], 1);

    let fingerprint = first["fingerprint"].as_str().expect("fingerprint");
    let report = json_output(typesage(dir.path()).args([
        "cache",
        "clear",
        "--fingerprint",
        fingerprint,
    ]));
    assert_eq!(report["analysis_results"], 1);

    assert!(dir.path().join("typesage.db").exists());
}

#[test]
fn annotate_reads_stdin() {
    let dir = TempDir::new().expect("temp dir");
    let annotation = json_output(
        typesage(dir.path())
            .args(["annotate", "-", "--offline"])
            .write_stdin("limit = 10\n\ndef scale(value):\n    return value * limit\n"),
    );
    assert_eq!(annotation["success"], true);
    let code = annotation["annotated_code"].as_str().expect("annotated code");
    assert!(code.contains("limit: int = 10"));
    assert!(code.contains("def scale(value: int | float) -> Any:"));
}

#[test]
fn malformed_source_reports_failure_without_crashing() {
    let dir = TempDir::new().expect("temp dir");
    let file = write_fixture(dir.path(), "broken.py", MALFORMED).expect("fixture");
    let result = json_output(typesage(dir.path()).arg("analyze").arg(&file).arg("--offline"));
    assert_eq!(result["success"], false);
    assert!(result["error"].is_string());
}

#[test]
fn memory_commands_on_empty_store() {
    let dir = TempDir::new().expect("temp dir");

    let patterns = json_output(typesage(dir.path()).args(["memory", "search"]));
    assert_eq!(patterns, Value::Array(Vec::new()));

    let export_path = dir.path().join("export.json");
    typesage(dir.path())
        .args(["memory", "export", "--output"])
        .arg(&export_path)
        .assert()
        .success();
    let export: Value =
        serde_json::from_str(&std::fs::read_to_string(&export_path).expect("export file"))
            .expect("export JSON");
    assert_eq!(export["version"], "1.0");
    assert_eq!(export["metadata"]["total_patterns"], 0);

    let history = json_output(typesage(dir.path()).args(["history", "--limit", "3"]));
    assert_eq!(history, Value::Array(Vec::new()));
}

#[test]
fn invalid_fingerprint_is_an_error() {
    let dir = TempDir::new().expect("temp dir");
    typesage(dir.path())
        .args(["cache", "clear", "--fingerprint", "not-hex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid fingerprint"));
}

#[test]
fn missing_input_file_is_an_error() {
    let dir = TempDir::new().expect("temp dir");
    typesage(dir.path())
        .args(["analyze", "does-not-exist.py", "--offline"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not read"));
}
