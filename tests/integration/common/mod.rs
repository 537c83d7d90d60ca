#![allow(dead_code)]

use std::{
    path::Path,
    thread,
    time::{Duration, Instant},
};

use subman::{ProcessHandle, Supervisor, SupervisorConfig};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

/// Supervisor with a short poll interval so exits are noticed quickly.
pub fn fast_supervisor() -> Supervisor {
    Supervisor::new(SupervisorConfig {
        poll_interval: Duration::from_millis(25),
    })
}

/// Polls `condition` until it holds, panicking after five seconds.
pub fn wait_until<F: FnMut() -> bool>(what: &str, mut condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if condition() {
            return;
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for {what}");
        }

        thread::sleep(Duration::from_millis(25));
    }
}

pub fn wait_for_path(path: &Path) {
    wait_until(&format!("{} to exist", path.display()), || path.exists());
}

/// Finds the tracked process whose argument vector equals `argv`.
pub fn find_by_argv(supervisor: &Supervisor, argv: &[&str]) -> Option<ProcessHandle> {
    supervisor
        .list_all()
        .into_iter()
        .find(|handle| handle.argv() == argv)
}

/// True when `pid` exists and is not a zombie.
pub fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
        .process(Pid::from_u32(pid))
        .is_some_and(|process| !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
}
