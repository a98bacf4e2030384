//! End-to-end tests for the `lectern` binary.
//!
//! These run the compiled CLI against a temporary store with the offline
//! embedding provider, so the whole ingest/status/search surface is exercised
//! without network access.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn lectern_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lectern");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/lectern.sqlite"

[documents]
dir = "{}/data/documents"

[chunking]
window_chars = 400
overlap_chars = 80

[embedding]
provider = "offline"
dims = 32

[server]
bind = "127.0.0.1:0"
"#,
        root.display(),
        root.display()
    );

    let config_path = root.join("config").join("lectern.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// Minimal valid PDF containing `phrase` as its only text.
fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET\n", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}endstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn run_lectern(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lectern_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lectern binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lectern(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Initialized knowledge store"));
    assert!(tmp.path().join("data").join("lectern.sqlite").exists());
    assert!(tmp.path().join("data").join("documents").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_lectern(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_lectern(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_directory() {
    let (tmp, config_path) = setup_test_env();
    let files_dir = tmp.path().join("files");
    fs::write(
        files_dir.join("broth.pdf"),
        minimal_pdf("skim the broth while it simmers"),
    )
    .unwrap();
    fs::write(
        files_dir.join("crust.pdf"),
        minimal_pdf("blind bake the crust with weights"),
    )
    .unwrap();

    run_lectern(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_lectern(&config_path, &["ingest", files_dir.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("processed: 2"), "{}", stdout);
    assert!(stdout.contains("failed: 0"), "{}", stdout);
    assert!(!stdout.contains("chunks written: 0"), "{}", stdout);
}

#[test]
fn test_ingest_reports_corrupt_file() {
    let (tmp, config_path) = setup_test_env();
    let files_dir = tmp.path().join("files");
    fs::write(files_dir.join("bad.pdf"), b"not a valid pdf").unwrap();
    fs::write(
        files_dir.join("good.pdf"),
        minimal_pdf("bloom the gelatin in cold water"),
    )
    .unwrap();

    run_lectern(&config_path, &["init"]);
    let (stdout, _, success) =
        run_lectern(&config_path, &["ingest", files_dir.to_str().unwrap()]);
    assert!(success, "a corrupt file must not abort the run: {}", stdout);
    assert!(stdout.contains("bad.pdf: failed"), "{}", stdout);
    assert!(stdout.contains("processed: 1"), "{}", stdout);
    assert!(stdout.contains("failed: 1"), "{}", stdout);
}

#[test]
fn test_ingest_missing_path_fails() {
    let (tmp, config_path) = setup_test_env();

    run_lectern(&config_path, &["init"]);
    let missing = tmp.path().join("nope");
    let (_, _, success) = run_lectern(&config_path, &["ingest", missing.to_str().unwrap()]);
    assert!(!success, "ingest of a missing path should exit nonzero");
}

#[test]
fn test_status_lists_documents() {
    let (tmp, config_path) = setup_test_env();
    let files_dir = tmp.path().join("files");
    fs::write(
        files_dir.join("souffle.pdf"),
        minimal_pdf("do not open the oven door early"),
    )
    .unwrap();

    run_lectern(&config_path, &["init"]);
    run_lectern(&config_path, &["ingest", files_dir.to_str().unwrap()]);

    let (stdout, _, success) = run_lectern(&config_path, &["status"]);
    assert!(success, "status failed: {}", stdout);
    assert!(stdout.contains("Status:      ready"), "{}", stdout);
    assert!(stdout.contains("souffle.pdf"), "{}", stdout);
    assert!(stdout.contains("processed"), "{}", stdout);
}

#[test]
fn test_status_on_fresh_store_is_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_lectern(&config_path, &["init"]);
    let (stdout, _, success) = run_lectern(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("Status:      empty"), "{}", stdout);
}

#[test]
fn test_search_finds_ingested_phrase() {
    let (tmp, config_path) = setup_test_env();
    let files_dir = tmp.path().join("files");
    fs::write(
        files_dir.join("lamb.pdf"),
        minimal_pdf("sear the lamb shoulder fat side down"),
    )
    .unwrap();

    run_lectern(&config_path, &["init"]);
    run_lectern(&config_path, &["ingest", files_dir.to_str().unwrap()]);

    let (stdout, _, success) = run_lectern(
        &config_path,
        &["search", "sear the lamb shoulder fat side down"],
    );
    assert!(success, "search failed: {}", stdout);
    assert!(stdout.contains("1. ["), "expected a ranked hit: {}", stdout);
    assert!(stdout.contains("excerpt:"), "{}", stdout);
    assert!(stdout.contains("lamb"), "{}", stdout);
}

#[test]
fn test_search_deterministic() {
    let (tmp, config_path) = setup_test_env();
    let files_dir = tmp.path().join("files");
    fs::write(
        files_dir.join("a.pdf"),
        minimal_pdf("reduce the sauce by half"),
    )
    .unwrap();
    fs::write(
        files_dir.join("b.pdf"),
        minimal_pdf("strain the custard twice"),
    )
    .unwrap();

    run_lectern(&config_path, &["init"]);
    run_lectern(&config_path, &["ingest", files_dir.to_str().unwrap()]);

    let (stdout1, _, _) = run_lectern(&config_path, &["search", "sauce"]);
    let (stdout2, _, _) = run_lectern(&config_path, &["search", "sauce"]);
    assert_eq!(
        stdout1, stdout2,
        "Search results should be deterministic across runs"
    );
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env();

    run_lectern(&config_path, &["init"]);
    let (stdout, _, success) = run_lectern(&config_path, &["search", ""]);
    assert!(success, "Empty query should not panic");
    assert!(stdout.contains("No results"));
}

#[test]
fn test_search_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_lectern(&config_path, &["init"]);
    let (stdout, _, success) = run_lectern(&config_path, &["search", "anything at all"]);
    assert!(success);
    assert!(stdout.contains("No results"));
}
