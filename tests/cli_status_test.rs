//! Integration tests for `stickyconf status`.

mod common;

use common::TestEnv;
use predicates::prelude::*;

fn status_json(env: &TestEnv) -> serde_json::Value {
    let output = env
        .stickyconf_with_files()
        .arg("status")
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_status_reports_pending_insert_without_writing() {
    let env = TestEnv::new();
    env.write_target("Port 80\n");
    env.write_overrides("Port 8080\n");

    let json = status_json(&env);

    assert_eq!(json["decision"], "insert_missing");
    assert_eq!(json["has_content"], true);
    assert_eq!(json["has_block"], false);
    assert_eq!(json["backup_count"], 0);
    assert!(json["stored_digest"].is_null());
    assert_eq!(env.read_target(), "Port 80\n");
}

#[test]
fn test_status_after_once_is_in_sync() {
    let env = TestEnv::new();
    env.write_target("Port 80\n");
    env.write_overrides("Port 8080\n");
    env.once_json();

    let json = status_json(&env);

    assert_eq!(json["decision"], "in_sync");
    assert_eq!(json["placement"], "both");
    assert_eq!(json["backup_count"], 1);
    assert!(json["latest_backup"].is_string());
    assert_eq!(json["desired_digest"], json["stored_digest"]);
    assert_eq!(json["desired_digest"], json["block_digest"]);
    let events = json["recent_events"].as_array().unwrap();
    assert!(events
        .iter()
        .any(|e| e.as_str().unwrap().contains("insert_missing")));
}

#[test]
fn test_status_detects_hand_edited_block() {
    let env = TestEnv::new();
    env.write_target("Port 80\n");
    env.write_overrides("Port 8080\n");
    env.once_json();

    let edited = env.read_target().replacen("Port 8080", "Port 1", 1);
    env.write_target(&edited);

    let json = status_json(&env);
    assert_eq!(json["decision"], "content_drifted");
}

#[test]
fn test_status_human_output() {
    let env = TestEnv::new();
    env.write_target("Port 80\n");
    env.write_overrides("Port 8080\n");
    env.once_json();

    env.stickyconf_with_files()
        .args(["status", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: in sync (overrides applied)"))
        .stdout(predicate::str::contains("service:    (none)"));
}

#[test]
fn test_status_missing_target_fails() {
    let env = TestEnv::new();
    env.write_overrides("Port 8080\n");

    env.stickyconf_with_files()
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""));
}
