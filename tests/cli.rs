use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Port 1 refuses connections, so any sync aborts on the first listing.
    let config_content = format!(
        r#"[db]
path = "{}/data/csync.sqlite"

[source]
name = "forum"
base_url = "http://127.0.0.1:1"
cooldown_ms = 0
timeout_secs = 2

[retry]
max_attempts = 1

[chunking]
max_tokens = 700
"#,
        root.display()
    );

    let config_path = config_dir.join("csync.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_csync(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_csync"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run csync");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_csync(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/csync.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_csync(&config_path, &["init"]);
    assert!(first, "first init failed");
    let (_, _, second) = run_csync(&config_path, &["init"]);
    assert!(second, "second init failed (not idempotent)");
}

#[test]
fn test_status_on_empty_database() {
    let (_tmp, config_path) = setup_test_env();
    run_csync(&config_path, &["init"]);

    let (stdout, stderr, success) = run_csync(&config_path, &["status"]);
    assert!(success, "status failed: {}", stderr);
    assert!(stdout.contains("Items:       0"));
    assert!(stdout.contains("Last item:   never"));
    assert!(!stdout.contains("Recent runs"));
}

#[test]
fn test_reset_requires_confirmation() {
    let (_tmp, config_path) = setup_test_env();
    run_csync(&config_path, &["init"]);

    let (_, stderr, success) = run_csync(&config_path, &["reset"]);
    assert!(!success);
    assert!(stderr.contains("--yes"));

    let (stdout, _, success) = run_csync(&config_path, &["reset", "--yes"]);
    assert!(success);
    assert!(stdout.contains("fingerprints removed: 0"));
}

#[test]
fn test_unreachable_source_aborts_and_is_recorded() {
    let (_tmp, config_path) = setup_test_env();
    run_csync(&config_path, &["init"]);

    let (stdout, stderr, success) = run_csync(&config_path, &["sync", "--progress", "off"]);
    assert!(!success, "sync should fail: stdout={}", stdout);
    assert!(stdout.contains("aborted"), "stdout={}", stdout);
    assert!(stderr.contains("sync aborted"), "stderr={}", stderr);

    let (stdout, _, success) = run_csync(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("Recent runs"));
    assert!(stdout.contains("aborted"));
}

#[test]
fn test_dry_run_on_unreachable_source_still_fails_listing() {
    let (_tmp, config_path) = setup_test_env();
    run_csync(&config_path, &["init"]);

    let (stdout, _, success) = run_csync(&config_path, &["sync", "--dry-run", "--progress", "off"]);
    assert!(!success);
    assert!(stdout.contains("(dry-run)"));

    // Dry runs leave no history
    let (stdout, _, _) = run_csync(&config_path, &["status"]);
    assert!(!stdout.contains("Recent runs"));
}

#[test]
fn test_missing_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_csync(&tmp.path().join("nope.toml"), &["status"]);
    assert!(!success);
    assert!(!stderr.is_empty());
}
