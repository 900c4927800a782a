//! Integration tests for `stickyconf config`.
//!
//! These tests verify:
//! - Precedence: CLI flag > environment > config.kdl > defaults
//! - `config init` writes a loadable starter file and refuses to clobber one

mod common;

use common::TestEnv;
use predicates::prelude::*;
use std::fs;

fn show_json(env: &TestEnv, extra: &[&str]) -> serde_json::Value {
    let output = env
        .stickyconf()
        .args(["config", "show"])
        .args(extra)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "config show failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn setting<'a>(json: &'a serde_json::Value, key: &str) -> &'a serde_json::Value {
    json["settings"]
        .as_array()
        .unwrap()
        .iter()
        .find(|entry| entry["key"] == key)
        .unwrap()
}

#[test]
fn test_show_without_config_file_uses_defaults() {
    let env = TestEnv::new();

    let json = show_json(&env, &[]);

    assert_eq!(json["config_loaded"], false);
    assert_eq!(setting(&json, "target")["value"], "(unset)");
    assert_eq!(setting(&json, "debounce-secs")["value"], "10");
    assert_eq!(setting(&json, "debounce-secs")["source"], "default");
    assert_eq!(setting(&json, "fallback-interval-secs")["value"], "180");
    assert_eq!(setting(&json, "placement")["value"], "both");
}

#[test]
fn test_show_precedence() {
    let env = TestEnv::new();
    env.write_config("service \"from-file\"\ndebounce-secs 3\n");

    let json = show_json(&env, &[]);
    assert_eq!(json["config_loaded"], true);
    assert_eq!(setting(&json, "service")["value"], "from-file");
    assert_eq!(setting(&json, "service")["source"], "config");
    assert_eq!(setting(&json, "debounce-secs")["value"], "3");

    let output = env
        .stickyconf()
        .env("STICKYCONF_SERVICE", "from-env")
        .args(["config", "show"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(setting(&json, "service")["value"], "from-env");
    assert_eq!(setting(&json, "service")["source"], "env:STICKYCONF_SERVICE");

    let output = env
        .stickyconf()
        .env("STICKYCONF_SERVICE", "from-env")
        .args(["config", "show", "--service", "from-cli"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(setting(&json, "service")["value"], "from-cli");
    assert_eq!(setting(&json, "service")["source"], "cli");
}

#[test]
fn test_show_rejects_invalid_config() {
    let env = TestEnv::new();
    env.write_config("debounce-secs \"soon\"\n");

    env.stickyconf()
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("debounce-secs"));
}

#[test]
fn test_show_explicit_config_flag() {
    let env = TestEnv::new();
    let other = env.path().join("other.kdl");
    fs::write(&other, "service \"other\"\n").unwrap();

    let json = show_json(&env, &["--config", other.to_str().unwrap()]);

    assert_eq!(setting(&json, "service")["value"], "other");
    assert!(json["config_path"].as_str().unwrap().ends_with("other.kdl"));
}

#[test]
fn test_init_writes_loadable_config() {
    let env = TestEnv::new();
    let target = env.target_path();

    env.stickyconf()
        .args(["config", "init", "--target", target.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"overwritten\":false"));

    let content = fs::read_to_string(env.config_path()).unwrap();
    assert!(content.contains("target"));
    assert!(content.contains("debounce-secs 10"));

    let json = show_json(&env, &[]);
    assert_eq!(json["config_loaded"], true);
    assert_eq!(setting(&json, "target")["source"], "config");
}

#[test]
fn test_init_refuses_existing_file_without_force() {
    let env = TestEnv::new();
    env.write_config("service \"mine\"\n");

    env.stickyconf()
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    assert_eq!(
        fs::read_to_string(env.config_path()).unwrap(),
        "service \"mine\"\n"
    );

    env.stickyconf()
        .args(["config", "init", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"overwritten\":true"));
}

#[cfg(unix)]
#[test]
fn test_init_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let env = TestEnv::new();
    env.stickyconf().args(["config", "init"]).assert().success();

    let mode = fs::metadata(env.config_path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
}
