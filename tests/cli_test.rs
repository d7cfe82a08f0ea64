//! CLI integration tests for the distill binary.

use std::process::Command;

/// Helper to run the CLI
fn run_cli(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_distill"))
        .args(args)
        .output()
        .expect("Failed to execute distill CLI");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn fixture(rel: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), rel)
}

#[test]
fn test_help_command() {
    let (stdout, _, success) = run_cli(&["--help"]);
    assert!(success, "Help command should succeed");
    assert!(stdout.contains("file"), "Should mention file command");
    assert!(stdout.contains("dir"), "Should mention dir command");
}

#[test]
fn test_version_command() {
    let (stdout, _, success) = run_cli(&["--version"]);
    assert!(success, "Version command should succeed");
    assert!(stdout.contains("0.1.0"), "Should show version");
}

#[test]
fn test_file_outline() {
    let (stdout, stderr, success) = run_cli(&["file", &fixture("python/car.py")]);
    assert!(success, "file command should succeed: {stderr}");
    assert!(stdout.contains("(python)"), "{stdout}");
    assert!(stdout.contains("+ class Car"), "{stdout}");
    assert!(stdout.contains("+ property mileage(self) -> int"), "{stdout}");
    assert!(stdout.contains("# method _get_diagnostic_code"), "{stdout}");
    assert!(stdout.contains("- method __log_activity"), "{stdout}");
    assert!(stdout.contains("Optional = Optional from typing [type-only]"), "{stdout}");
}

#[test]
fn test_file_json() {
    let (stdout, stderr, success) = run_cli(&["file", &fixture("rust/geometry.rs"), "--json"]);
    assert!(success, "file --json should succeed: {stderr}");
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(json["schema_version"], "1.0");
    assert_eq!(json["dialect"], "rust");
    assert_eq!(json["root"]["name"], "geometry");
    assert!(json["imports"].as_array().is_some_and(|a| a.len() == 3));
}

#[test]
fn test_public_only_flag() {
    let (stdout, _, success) = run_cli(&["file", &fixture("python/car.py"), "--public-only"]);
    assert!(success);
    assert!(!stdout.contains("__log_activity"), "{stdout}");
    assert!(stdout.contains("_get_diagnostic_code"), "{stdout}");
}

#[test]
fn test_no_imports_flag() {
    let (stdout, _, success) = run_cli(&["file", &fixture("python/car.py"), "--no-imports", "--json"]);
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    let children = json["root"]["children"].as_array().expect("children");
    assert!(children.iter().all(|c| c["kind"] != "import"));
    assert!(json["imports"].as_array().is_some_and(|a| a.len() == 1));
}

#[test]
fn test_language_override() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("script");
    std::fs::write(&path, "def main():\n    pass\n").unwrap();
    let path = path.to_string_lossy().to_string();

    let (stdout, _, success) = run_cli(&["file", &path, "--lang", "python"]);
    assert!(success);
    assert!(stdout.contains("function main()"), "{stdout}");

    let (_, stderr, success) = run_cli(&["file", &path]);
    assert!(!success, "Unknown extension should fail");
    assert!(stderr.contains("Unsupported language"), "{stderr}");
}

#[test]
fn test_missing_file_fails() {
    let (_, stderr, success) = run_cli(&["file", "/definitely/not/here.py", "--json"]);
    assert!(!success);
    let json: serde_json::Value = serde_json::from_str(&stderr).expect("JSON error on stderr");
    assert!(json["error"].as_str().is_some_and(|e| e.contains("Failed to read")));
}

#[test]
fn test_dir_command() {
    let root = fixture("");
    let (stdout, stderr, success) = run_cli(&["dir", &root, "--json", "--jobs", "2"]);
    assert!(success, "dir command should succeed: {stderr}");
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    let files = json["files"].as_array().expect("files array");
    assert_eq!(files.len(), 8);
    assert!(json["errors"].as_array().is_some_and(|e| e.is_empty()));

    let (stdout, _, success) = run_cli(&["dir", &root, "--lang", "rust"]);
    assert!(success);
    assert!(stdout.starts_with("Distilled 1 files"), "{stdout}");
}

#[test]
fn test_dir_exclude() {
    let root = fixture("");
    let (stdout, _, success) = run_cli(&["dir", &root, "--exclude", "malformed/**", "--json"]);
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    let paths: Vec<&str> = json["files"]
        .as_array()
        .map(|a| a.iter().filter_map(|f| f["path"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(paths.len(), 6);
    assert!(paths.iter().all(|p| !p.contains("malformed")));
}
