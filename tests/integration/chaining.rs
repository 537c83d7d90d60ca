#![cfg(unix)]

#[path = "common/mod.rs"]
mod common;

use std::{fs, thread, time::Duration};

use common::{fast_supervisor, find_by_argv, wait_for_path, wait_until};
use tempfile::tempdir;

#[test]
fn completion_command_replaces_exited_process() {
    let supervisor = fast_supervisor();
    let first = supervisor
        .start("sh", &["-c", "exit 0", "--test"], Some("sleep 30"))
        .unwrap();
    assert_eq!(first.completion.as_deref(), Some("sleep 30"));

    wait_until("completion command to be tracked", || {
        find_by_argv(&supervisor, &["sleep", "30"]).is_some()
    });
    wait_until("first process to be reaped", || {
        supervisor.lookup(first.pid).is_none()
    });

    let tracked = supervisor.list_all();
    assert_eq!(tracked.len(), 1);
    let second = &tracked[0];
    assert_ne!(second.pid, first.pid);
    assert_eq!(second.argv(), vec!["sleep", "30"]);
    assert!(
        second.completion.is_none(),
        "chained commands carry no completion command of their own"
    );

    supervisor.shutdown();
}

#[test]
fn quoted_completion_command_runs_after_exit() {
    let temp = tempdir().unwrap();
    let marker = temp.path().join("chained.txt");
    let completion = format!("sh -c 'echo \"chained run\" > {}'", marker.display());

    let supervisor = fast_supervisor();
    supervisor
        .start::<&str>("true", &[], Some(completion.as_str()))
        .unwrap();

    assert!(supervisor.wait_idle(Some(Duration::from_secs(5))));
    assert_eq!(fs::read_to_string(&marker).unwrap().trim(), "chained run");
}

#[test]
fn chain_keeps_supervisor_busy_until_completion_exits() {
    let temp = tempdir().unwrap();
    let marker = temp.path().join("done.txt");
    let completion = format!("sh -c 'sleep 0.3; touch {}'", marker.display());

    let supervisor = fast_supervisor();
    supervisor.start("sleep", &["0.1"], Some(completion.as_str())).unwrap();

    // Idle is only reached once the completion command itself has exited.
    assert!(supervisor.wait_idle(Some(Duration::from_secs(5))));
    assert!(marker.exists());
}

#[test]
fn killed_process_still_runs_its_completion_command() {
    let temp = tempdir().unwrap();
    let marker = temp.path().join("after-kill.txt");
    let completion = format!("touch {}", marker.display());

    let supervisor = fast_supervisor();
    let handle = supervisor
        .start("sleep", &["30"], Some(completion.as_str()))
        .unwrap();

    assert!(supervisor.kill(handle.pid));
    wait_for_path(&marker);
    assert!(supervisor.wait_idle(Some(Duration::from_secs(5))));
}

#[test]
fn failed_start_never_runs_completion_command() {
    let temp = tempdir().unwrap();
    let marker = temp.path().join("never.txt");
    let completion = format!("touch {}", marker.display());

    let supervisor = fast_supervisor();
    assert!(
        supervisor
            .start::<&str>(
                "definitely-not-a-real-executable-xyz",
                &[],
                Some(completion.as_str()),
            )
            .is_err()
    );

    thread::sleep(Duration::from_millis(300));
    assert!(!marker.exists());
    assert!(supervisor.is_idle());
}

#[test]
fn shutdown_does_not_run_completion_commands() {
    let temp = tempdir().unwrap();
    let marker = temp.path().join("skipped.txt");
    let completion = format!("touch {}", marker.display());

    let supervisor = fast_supervisor();
    supervisor
        .start("sleep", &["30"], Some(completion.as_str()))
        .unwrap();
    supervisor.shutdown();

    thread::sleep(Duration::from_millis(300));
    assert!(!marker.exists());
    assert!(supervisor.is_idle());
}

#[test]
fn independent_chains_do_not_interfere() {
    let temp = tempdir().unwrap();
    let markers: Vec<_> = (0..3)
        .map(|idx| temp.path().join(format!("chain_{idx}.txt")))
        .collect();

    let supervisor = fast_supervisor();
    for (idx, marker) in markers.iter().enumerate() {
        let delay = format!("0.{idx}");
        supervisor
            .start(
                "sleep",
                &[delay.as_str()],
                Some(format!("touch {}", marker.display()).as_str()),
            )
            .unwrap();
    }

    assert!(supervisor.wait_idle(Some(Duration::from_secs(5))));
    for marker in &markers {
        assert!(marker.exists(), "{} missing", marker.display());
    }
}
