#![cfg(unix)]

use std::fs;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::tempdir;

#[test]
fn run_chains_completion_command_before_returning() {
    let temp = tempdir().expect("failed to create tempdir");
    let marker = temp.path().join("done.txt");

    Command::new(assert_cmd::cargo::cargo_bin!("subman"))
        .arg("run")
        .arg("--poll-interval")
        .arg("50ms")
        .arg("--then")
        .arg(format!("sh -c 'echo finished > {}'", marker.display()))
        .arg("--")
        .arg("sh")
        .arg("-c")
        .arg("exit 3")
        .assert()
        .success();

    let contents = fs::read_to_string(&marker).expect("completion command should have run");
    assert_eq!(contents.trim(), "finished");
}

#[test]
fn run_reports_spawn_failure() {
    Command::new(assert_cmd::cargo::cargo_bin!("subman"))
        .arg("run")
        .arg("--then")
        .arg("true")
        .arg("--")
        .arg("definitely-not-a-real-executable-xyz")
        .assert()
        .failure()
        .stderr(contains("definitely-not-a-real-executable-xyz"));
}

#[test]
fn run_logs_registry_activity_at_trace_level() {
    Command::new(assert_cmd::cargo::cargo_bin!("subman"))
        .arg("--log-level")
        .arg("trace")
        .arg("run")
        .arg("--")
        .arg("true")
        .assert()
        .success()
        .stderr(contains("add() (pid:"))
        .stderr(contains("remove() (pid:"));
}

#[test]
fn up_starts_every_process_in_the_file() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let first = dir.join("first.txt");
    let second = dir.join("second.txt");

    let config_path = dir.join("subman.yaml");
    fs::write(
        &config_path,
        format!(
            r#"version: "1"
poll_interval: "50ms"
processes:
  first:
    command: "sleep 0.2"
    completion: "touch {}"
  second:
    command: "sh -c 'touch {}'"
"#,
            first.display(),
            second.display()
        ),
    )
    .expect("failed to write config");

    Command::new(assert_cmd::cargo::cargo_bin!("subman"))
        .arg("up")
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .assert()
        .success();

    assert!(first.exists(), "completion command of 'first' should have run");
    assert!(second.exists(), "'second' should have run");
}

#[test]
fn up_rejects_missing_config() {
    let temp = tempdir().expect("failed to create tempdir");
    let missing = temp.path().join("absent.yaml");

    Command::new(assert_cmd::cargo::cargo_bin!("subman"))
        .arg("up")
        .arg("-c")
        .arg(missing.to_str().unwrap())
        .assert()
        .failure()
        .stderr(contains("absent.yaml"));
}
