#![allow(deprecated)]
//! Exit-code and output contract of the `entitle` binary. Only offline
//! paths are exercised here; the remote exchanges are covered in the core
//! crate's tests.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

const ENV_VARS: [&str; 8] = [
    "ENTITLE_CONFIG",
    "ENTITLE_ACTOR",
    "ENTITLE_AUTHORITY_URL",
    "ENTITLE_DB",
    "ENTITLE_TIMEOUT",
    "ENTITLE_MAX_RETRIES",
    "ENTITLE_CACHE_TTL",
    "ENTITLE_STALE_CEILING",
];

fn entitle(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("entitle").unwrap();
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env_remove("RUST_LOG");
    cmd.arg("--db").arg(dir.path().join("entitle.db"));
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout must be JSON")
}

#[test]
fn test_validate_without_authority_is_not_configured() {
    let dir = tempdir().unwrap();
    let output = entitle(&dir).args(["validate", "--force"]).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let result = stdout_json(&output);
    assert_eq!(result["error_kind"], "not_configured");
    assert_eq!(result["plan"], "FREE");
    assert_eq!(result["contract_active"], Value::Null);
}

#[test]
fn test_configure_is_audited() {
    let dir = tempdir().unwrap();
    let output = entitle(&dir)
        .args(["configure", "--base-url", "https://licensing.test/v1/"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let outcome = stdout_json(&output);
    assert_eq!(outcome["changed"], true);
    assert_eq!(outcome["base_url"], "https://licensing.test/v1");

    let output = entitle(&dir)
        .args(["--actor", "ops", "audit", "config", "--limit", "5"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let changes = stdout_json(&output);
    let changes = changes.as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["actor"], "cli");
    assert_eq!(changes[0]["section"], "authority");
}

#[test]
fn test_read_only_caller_is_denied() {
    let dir = tempdir().unwrap();
    entitle(&dir)
        .args(["--read-only", "configure", "--base-url", "https://licensing.test"])
        .assert()
        .code(4)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("permission denied"));
}

#[test]
fn test_bad_base_url_is_input_error() {
    let dir = tempdir().unwrap();
    entitle(&dir)
        .args(["configure", "--base-url", "ftp://licensing.test"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid base_url"));
}

#[test]
fn test_invalid_module_key_is_input_error() {
    let dir = tempdir().unwrap();
    entitle(&dir)
        .args(["modules", "usable", "Not A Key"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid module_key"));
}

#[test]
fn test_unknown_module_cannot_be_installed() {
    let dir = tempdir().unwrap();
    entitle(&dir)
        .args(["modules", "install", "assets"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown module"));
}

#[test]
fn test_empty_module_list() {
    let dir = tempdir().unwrap();
    let output = entitle(&dir).args(["modules", "list"]).output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output), Value::Array(vec![]));
}
