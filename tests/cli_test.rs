//! Smoke tests for the `oa-tokendiff` binary.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("should write source file");
    path
}

fn run(args: &[&OsStr]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_oa-tokendiff"))
        .args(args)
        .output()
        .expect("should spawn binary")
}

#[test]
fn test_json_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let old = write(dir.path(), "old.js", "let age;");
    let new = write(dir.path(), "new.js", "let age;\nlet name;");

    let output = run(&[old.as_os_str(), new.as_os_str()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    let changes = json["changes"].as_array().expect("changes array");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["kind"], "addition");
    assert_eq!(json["alignment"]["a"], serde_json::json!([1]));
}

#[test]
fn test_aligned_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let old = write(dir.path(), "old.js", "x();\nz();\n");
    let new = write(dir.path(), "new.js", "x();\ny();\nz();\n");

    let output = run(&[
        old.as_os_str(),
        new.as_os_str(),
        OsStr::new("--aligned"),
        OsStr::new("--alignment-text"),
        OsStr::new("~~~"),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).expect("utf-8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines[0].starts_with("=== a:"));
    assert_eq!(&lines[1..4], ["x();", "~~~", "z();"]);
    assert!(lines[4].starts_with("=== b:"));
    assert_eq!(&lines[5..8], ["x();", "y();", "z();"]);
}

#[test]
fn test_config_file_and_debug_labels() {
    let dir = tempfile::tempdir().expect("tempdir");
    let old = write(dir.path(), "old.js", "a\nb");
    let new = write(dir.path(), "new.js", "b\na");
    let config = write(dir.path(), "options.json", r#"{"minimumLinesMoved": 1}"#);

    let output = run(&[
        old.as_os_str(),
        new.as_os_str(),
        OsStr::new("--config"),
        config.as_os_str(),
        OsStr::new("--debug"),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    assert_eq!(json["changes"], serde_json::json!([]));
    assert_eq!(json["matches"][0]["resolution"], "suppressed");
    assert_eq!(json["tokensA"][0]["label"], "identifier");
}

#[test]
fn test_missing_file_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let old = write(dir.path(), "old.js", "x");
    let missing = dir.path().join("missing.js");

    let output = run(&[old.as_os_str(), missing.as_os_str()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing.js"));
}

#[test]
fn test_usage_error() {
    let output = run(&[OsStr::new("only-one.js")]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("usage"));
}
