use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("awesome_sink.md"),
        "# The AWESOME Sink\n\nThe AWESOME Sink converts surplus factory parts into coupons. \
         Coupons are redeemed at the AWESOME Shop for special equipment and blueprints. \
         Sink points scale with item complexity, so refined products yield far more coupons \
         than raw ore ever could.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("pasture_notes.md"),
        "# Pasture Notes\n\nRotating cattle between pastures keeps the grass healthy and \
         reduces parasite load. Fresh water must be available in every paddock, and shade \
         matters more than most new ranchers expect during the summer months.",
    )
    .unwrap();

    let config_content = format!(
        r#"[store]
path = "{root}/data/test.db"
collection = "test_docs"

[chunking]
chunk_size = 400
chunk_overlap = 50
min_chars = 20

[embedding]
provider = "hashed"
dims = 128

[reranker]
provider = "lexical"

[sources.local]
dir = "{root}/docs"
extension = "md"
"#,
        root = root.display()
    );

    let config_path = root.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_store() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rag(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Store ready"));

    // Idempotent.
    let (_, stderr, success) = run_rag(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_ingest_local_reports_chunk_count() {
    let (_tmp, config_path) = setup_test_env();

    run_rag(&config_path, &["init"]);
    let (stdout, stderr, success) = run_rag(&config_path, &["ingest", "local"]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("Ingested"));
    assert!(!stdout.contains("Ingested 0 chunks"));
}

#[test]
fn test_reingest_does_not_duplicate() {
    let (_tmp, config_path) = setup_test_env();

    run_rag(&config_path, &["init"]);
    let (first, _, _) = run_rag(&config_path, &["ingest", "local"]);
    let (second, _, _) = run_rag(&config_path, &["ingest", "local"]);
    assert_eq!(first, second, "re-ingestion changed the chunk count");
}

#[test]
fn test_search_finds_relevant_document() {
    let (_tmp, config_path) = setup_test_env();

    run_rag(&config_path, &["init"]);
    run_rag(&config_path, &["ingest", "local"]);

    let (stdout, stderr, success) = run_rag(
        &config_path,
        &["search", "What is the AWESOME Sink?", "--top-n", "1"],
    );
    assert!(success, "search failed: {}", stderr);
    assert!(
        stdout.contains("AWESOME Sink"),
        "top hit should come from the sink document, got: {}",
        stdout
    );
    assert!(!stdout.contains("pasture"));
}

#[test]
fn test_search_empty_store_prints_no_results() {
    let (_tmp, config_path) = setup_test_env();

    run_rag(&config_path, &["init"]);
    let (stdout, _, success) = run_rag(&config_path, &["search", "anything at all"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_ingest_unknown_source_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_rag(&config_path, &["ingest", "gopher"]);
    assert!(!success);
    assert!(stderr.contains("Unknown source"));
}

#[test]
fn test_ingest_unconfigured_source_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_rag(&config_path, &["ingest", "github"]);
    assert!(!success);
    assert!(stderr.contains("sources.github"));
}
