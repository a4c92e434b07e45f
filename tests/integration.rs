//! CLI integration tests driving the modidx binary end to end.

use assert_cmd::Command;
use predicates::prelude::*;

fn modidx() -> Command {
    let mut cmd = Command::cargo_bin("modidx").unwrap();
    // Keep worker spawning deterministic regardless of the host env.
    cmd.env_remove("MODIDX_NO_POOL")
        .env_remove("MODIDX_WORKERS")
        .env_remove("MODIDX_RECYCLE_AFTER");
    cmd
}

#[test]
fn test_parse_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("cultures.txt");
    std::fs::write(&file, "culture = { name = norse melting_pot = yes }").unwrap();

    modidx()
        .args(["parse"])
        .arg(&file)
        .env("MODIDX_ROOT", dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("ok:"));
}

#[test]
fn test_parse_json_output_is_valid_json() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    std::fs::write(&file, "tag = FRA").unwrap();

    let output = modidx()
        .args(["parse", "--json"])
        .arg(&file)
        .env("MODIDX_ROOT", dir.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert!(value["statements"].is_array());
}

#[test]
fn test_parse_syntax_error_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("bad.txt");
    std::fs::write(&file, "tag FRA").unwrap();

    modidx()
        .args(["parse"])
        .arg(&file)
        .env("MODIDX_ROOT", dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("syntax_error"));
}

#[test]
fn test_parse_missing_file_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    modidx()
        .args(["parse", "no_such_file.txt"])
        .env("MODIDX_ROOT", dir.path())
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot resolve"));
}

#[test]
fn test_parse_stdin() {
    let dir = tempfile::tempdir().unwrap();
    modidx()
        .args(["parse", "--stdin"])
        .env("MODIDX_ROOT", dir.path())
        .write_stdin("a = { 1 2 3 }")
        .assert()
        .success()
        .stdout(predicate::str::contains("ok:"));
}

#[test]
fn test_parse_stdin_with_no_pool_fallback() {
    let dir = tempfile::tempdir().unwrap();
    modidx()
        .args(["parse", "--stdin"])
        .env("MODIDX_ROOT", dir.path())
        .env("MODIDX_NO_POOL", "1")
        .write_stdin("a = 1")
        .assert()
        .success()
        .stdout(predicate::str::contains("ok:"));
}

#[test]
fn test_scan_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a = 1").unwrap();
    std::fs::write(dir.path().join("b.txt"), "b = { x = 1 }").unwrap();
    std::fs::write(dir.path().join("notes.md"), "not a script").unwrap();

    modidx()
        .args(["scan"])
        .arg(dir.path())
        .env("MODIDX_ROOT", dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("scanned 2 files"))
        .stderr(predicate::str::contains("2 parsed"));
}

#[test]
fn test_scan_reports_failures_and_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("good.txt"), "a = 1").unwrap();
    std::fs::write(dir.path().join("bad.txt"), "} broken").unwrap();

    modidx()
        .args(["scan"])
        .arg(dir.path())
        .env("MODIDX_ROOT", dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 failed"))
        .stderr(predicate::str::contains("bad.txt"));
}

#[test]
fn test_completions_bash() {
    modidx()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("modidx"));
}

#[test]
fn test_invalid_env_worker_count_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    modidx()
        .args(["parse", "--stdin"])
        .env("MODIDX_ROOT", dir.path())
        .env("MODIDX_WORKERS", "lots")
        .write_stdin("a = 1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("MODIDX_WORKERS"));
}
