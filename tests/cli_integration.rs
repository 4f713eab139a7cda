//! CLI smoke tests against the built binary

use assert_cmd::Command;
use predicates::prelude::*;

fn talaria() -> Command {
    Command::cargo_bin("talaria").expect("binary should build")
}

#[test]
fn test_help_lists_commands() {
    talaria()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn test_version_flag() {
    talaria()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("talaria"));
}

#[test]
fn test_history_list_empty_database() {
    let dir = tempfile::tempdir().unwrap();
    talaria()
        .env("TALARIA_HISTORY_DB", dir.path().join("history.db"))
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversation history found"));
}

#[test]
fn test_history_delete_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    talaria()
        .env("TALARIA_HISTORY_DB", dir.path().join("history.db"))
        .args(["history", "delete", "nonexistent-id"])
        .assert()
        .success();
}

#[test]
fn test_config_show_redacts_key() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("talaria.yaml");
    std::fs::write(&config_path, "api:\n  key: sk-super-secret\n").unwrap();

    talaria()
        .env_remove("TALARIA_API_KEY")
        .args(["--config", config_path.to_str().unwrap(), "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("sk-super-secret").not());
}

#[test]
fn test_config_set_persists_value() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("talaria.yaml");

    talaria()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "config",
            "set",
            "api.model",
            "deepseek-coder",
        ])
        .assert()
        .success();

    let contents = std::fs::read_to_string(&config_path).unwrap();
    assert!(contents.contains("deepseek-coder"));
}

#[test]
fn test_config_set_rejects_invalid_value() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("talaria.yaml");

    talaria()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "config",
            "set",
            "api.temperature",
            "9.5",
        ])
        .assert()
        .failure();
}

#[test]
fn test_unknown_command_fails() {
    talaria().arg("bogus").assert().failure();
}
