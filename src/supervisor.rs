//! Lifecycle supervisor: spawns commands, reaps them, and chains completion commands.
use std::{
    collections::HashSet,
    io,
    process::{Child, ExitStatus},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use strum_macros::AsRefStr;
use tracing::{debug, error, info, warn};

use crate::{
    command::{self, CommandLine, PreparedCommand},
    error::SupervisorError,
    registry::{ProcessHandle, Registry, TrackedProcess},
};

/// Default cadence at which the monitor loop checks children for exit.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tunables for a [`Supervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// How often tracked children are checked for exit.
    pub poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Notifications observed for a single supervised process.
#[derive(Debug, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
enum LifecycleEvent {
    /// The OS confirmed the process is executing.
    Started(TrackedProcess),
    /// The OS reported a fault while querying a live process. `repeated` is
    /// set when the same pid already faulted on an earlier poll.
    RuntimeError {
        pid: u32,
        error: io::Error,
        repeated: bool,
    },
    /// The process terminated. Its entry has already left the table.
    Exited {
        process: TrackedProcess,
        code: Option<i32>,
        signal: Option<i32>,
    },
}

impl LifecycleEvent {
    fn pid(&self) -> u32 {
        match self {
            LifecycleEvent::Started(entry) | LifecycleEvent::Exited { process: entry, .. } => {
                entry.pid()
            }
            LifecycleEvent::RuntimeError { pid, .. } => *pid,
        }
    }
}

/// Launches child processes, keeps the registry in step with their lifecycle
/// and runs completion commands once a tracked process exits.
///
/// Registry mutation happens in two places only: `start`/`monitor` on the
/// caller's thread (start confirmation) and the monitor thread (exit). Both go
/// through [`Supervisor::handle_event`] and serialize on the registry mutex.
///
/// Dropping the supervisor kills and reaps every tracked process.
pub struct Supervisor {
    /// Table of live supervised processes.
    registry: Arc<Registry>,
    /// Tunables fixed at construction.
    config: SupervisorConfig,
    /// Flag indicating whether the monitor loop should remain active.
    running: Arc<AtomicBool>,
    /// Handle to the background monitor thread once spawned.
    monitor_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

impl Supervisor {
    /// Creates a supervisor with an empty registry. The monitor thread starts
    /// with the first supervised process.
    pub fn new(config: SupervisorConfig) -> Self {
        debug!("Initializing supervisor (poll interval: {:?})", config.poll_interval);
        Self {
            registry: Arc::new(Registry::new()),
            config,
            running: Arc::new(AtomicBool::new(false)),
            monitor_handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Executes `program` with `args` as a supervised child process.
    ///
    /// When `completion` is given it is tokenized and started once this
    /// process exits. A failure to create the process is returned to the
    /// caller and nothing is registered.
    pub fn start<S: AsRef<str>>(
        &self,
        program: &str,
        args: &[S],
        completion: Option<&str>,
    ) -> Result<ProcessHandle, SupervisorError> {
        self.ensure_monitoring()?;
        Self::launch(
            &self.registry,
            CommandLine::new(program, args),
            completion.map(str::to_string),
        )
    }

    /// Tokenizes `line` with shell-like rules, then behaves like [`Supervisor::start`].
    pub fn start_command_line(
        &self,
        line: &str,
        completion: Option<&str>,
    ) -> Result<ProcessHandle, SupervisorError> {
        let parsed = CommandLine::parse(line)?;
        self.start(&parsed.program, parsed.args.as_slice(), completion)
    }

    /// Puts an already spawned child under supervision.
    pub fn monitor(
        &self,
        child: Child,
        command: CommandLine,
        completion: Option<&str>,
    ) -> Result<ProcessHandle, SupervisorError> {
        self.ensure_monitoring()?;
        let spawn_label = command.program.clone();
        let entry = TrackedProcess::new(
            child,
            command,
            spawn_label,
            normalize_completion(completion.map(str::to_string)),
        );
        Self::handle_started(&self.registry, entry)
    }

    /// Every tracked process, in no particular order.
    pub fn list_all(&self) -> Vec<ProcessHandle> {
        self.registry.list_all()
    }

    pub fn lookup(&self, pid: u32) -> Option<ProcessHandle> {
        self.registry.lookup(pid)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// True when nothing is tracked and no exit is still being handled.
    pub fn is_idle(&self) -> bool {
        self.registry.is_idle()
    }

    /// Forcibly kills a tracked process.
    ///
    /// The entry stays in place until the monitor loop observes the exit, so
    /// a configured completion command still runs. Returns `false` when the
    /// pid is not tracked or the kill request failed.
    pub fn kill(&self, pid: u32) -> bool {
        let mut entries = self.registry.entries();
        let Some(entry) = entries.get_mut(&pid) else {
            return false;
        };

        match entry.child_mut().kill() {
            Ok(()) => {
                info!("Sent kill to process (pid: {pid})");
                true
            }
            Err(err) => {
                warn!("Failed to kill process (pid: {pid}): {err}");
                false
            }
        }
    }

    /// Blocks until no process is tracked, or until `timeout` elapses.
    ///
    /// An exited process counts as busy until its completion command is
    /// registered, so a running chain never looks idle.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let step = self.config.poll_interval.min(Duration::from_millis(50));

        loop {
            if self.registry.is_idle() {
                return true;
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return false;
            }
            thread::sleep(step);
        }
    }

    /// Stops the monitor loop, then kills and reaps every tracked process.
    /// Completion commands are not run.
    pub fn shutdown(&self) {
        self.shutdown_monitor();

        for mut entry in self.registry.drain() {
            terminate(&mut entry);
        }
    }

    /// Ensures the background monitor thread is running.
    fn ensure_monitoring(&self) -> Result<(), SupervisorError> {
        let mut handle_slot = self.monitor_handle.lock()?;
        let should_spawn = match handle_slot.as_ref() {
            Some(handle) => handle.is_finished(),
            None => true,
        };

        if should_spawn {
            debug!("Starting process monitoring thread...");
            self.running.store(true, Ordering::SeqCst);

            let registry = Arc::clone(&self.registry);
            let running = Arc::clone(&self.running);
            let poll_interval = self.config.poll_interval;

            let handle = thread::Builder::new()
                .name("subman-monitor".into())
                .spawn(move || Self::monitor_loop(registry, running, poll_interval))
                .map_err(|source| SupervisorError::SpawnError {
                    command: "subman-monitor".into(),
                    source,
                })?;

            *handle_slot = Some(handle);
        }

        Ok(())
    }

    /// Signals the monitoring thread to exit and waits for it to finish.
    fn shutdown_monitor(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = match self.monitor_handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Checks all tracked processes for exit until `running` is cleared.
    fn monitor_loop(registry: Arc<Registry>, running: Arc<AtomicBool>, poll_interval: Duration) {
        let mut faulted = HashSet::new();
        while running.load(Ordering::SeqCst) {
            for event in Self::poll_exits(&registry, &mut faulted) {
                if let Err(err) = Self::handle_event(&registry, event) {
                    error!("{err}");
                }
            }
            thread::sleep(poll_interval);
        }

        debug!("Monitor loop terminating.");
    }

    /// Collects exit and runtime-error notifications without holding the lock
    /// while they are handled.
    ///
    /// `try_wait` reaps, which frees the pid, so exited entries are detached
    /// before the lock is released. `faulted` remembers pids whose last poll
    /// failed.
    fn poll_exits(registry: &Registry, faulted: &mut HashSet<u32>) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        let mut exits = Vec::new();
        let mut entries = registry.entries();

        for (pid, entry) in entries.iter_mut() {
            match entry.child_mut().try_wait() {
                Ok(Some(status)) => exits.push((*pid, status.code(), exit_signal(&status))),
                Ok(None) => {
                    faulted.remove(pid);
                }
                Err(error) if is_unwaitable(&error) => {
                    debug!("Process was reaped outside the supervisor (pid: {pid}): {error}");
                    exits.push((*pid, None, None));
                }
                Err(error) => events.push(LifecycleEvent::RuntimeError {
                    pid: *pid,
                    repeated: !faulted.insert(*pid),
                    error,
                }),
            }
        }

        for (pid, code, signal) in exits {
            faulted.remove(&pid);
            if let Some(process) = registry.detach_exited(&mut entries, pid) {
                events.push(LifecycleEvent::Exited {
                    process,
                    code,
                    signal,
                });
            }
        }
        faulted.retain(|pid| entries.contains_key(pid));

        events
    }

    /// Creates the OS process and, once it is confirmed running, registers it.
    fn launch(
        registry: &Registry,
        command_line: CommandLine,
        completion: Option<String>,
    ) -> Result<ProcessHandle, SupervisorError> {
        let completion = normalize_completion(completion);
        info!(
            "start() (command: {}) (arguments: {}) (completion command: {})",
            command_line.program,
            if command_line.args.is_empty() {
                "-".to_string()
            } else {
                command_line.args.join(" ")
            },
            completion.as_deref().unwrap_or("-"),
        );

        if command_line.program.trim().is_empty() {
            error!("child process spawn error: empty command");
            return Err(SupervisorError::EmptyCommand);
        }

        let PreparedCommand {
            mut command,
            spawn_label,
        } = command::build(&command_line);

        match command.spawn() {
            Ok(child) => {
                let entry = TrackedProcess::new(child, command_line, spawn_label, completion);
                Self::handle_started(registry, entry)
            }
            Err(source) => {
                error!(
                    "child process spawn error (message: {source}) (spawnfile: {spawn_label})"
                );
                Err(SupervisorError::SpawnError {
                    command: command_line.program,
                    source,
                })
            }
        }
    }

    /// Registers `entry` and returns its own handle.
    fn handle_started(
        registry: &Registry,
        entry: TrackedProcess,
    ) -> Result<ProcessHandle, SupervisorError> {
        let handle = entry.handle();
        Self::handle_event(registry, LifecycleEvent::Started(entry))?;
        Ok(handle)
    }

    /// Applies one lifecycle notification to the registry.
    fn handle_event(registry: &Registry, event: LifecycleEvent) -> Result<(), SupervisorError> {
        let pid = event.pid();
        debug!("lifecycle event '{}' (pid: {pid})", event.as_ref());

        match event {
            LifecycleEvent::Started(entry) => {
                if let Err(mut rejected) = registry.insert(entry) {
                    // The table still holds a live process under this pid, so
                    // the newcomer cannot be tracked. Do not leak it.
                    warn!(
                        "pid already tracked, terminating new process (pid: {pid}) (spawnfile: {})",
                        rejected.handle().spawn_label
                    );
                    terminate(&mut rejected);
                    return Err(SupervisorError::DuplicatePid(pid));
                }
            }
            LifecycleEvent::RuntimeError {
                error, repeated, ..
            } => {
                let spawn_label = registry
                    .lookup(pid)
                    .map(|handle| handle.spawn_label)
                    .unwrap_or_default();
                if repeated {
                    debug!(
                        "child process runtime error (message: {error}) (pid: {pid}) (spawnfile: {spawn_label})"
                    );
                } else {
                    error!(
                        "child process runtime error (message: {error}) (pid: {pid}) (spawnfile: {spawn_label})"
                    );
                }
            }
            LifecycleEvent::Exited {
                process,
                code,
                signal,
            } => {
                let tracked = process.handle();
                let code_label = code.map_or_else(|| "-".to_string(), |c| c.to_string());
                let signal_label = signal.map_or_else(|| "N/A".to_string(), describe_signal);
                if code == Some(0) {
                    info!(
                        "child process exited (pid: {pid}) (spawnfile: {}) (code: {code_label}) (signal: {signal_label})",
                        tracked.spawn_label
                    );
                } else {
                    warn!(
                        "child process exited (pid: {pid}) (spawnfile: {}) (code: {code_label}) (signal: {signal_label})",
                        tracked.spawn_label
                    );
                }

                if let Some(completion) = tracked.completion.as_deref() {
                    Self::run_completion(registry, pid, completion);
                }

                // Releases the reaped handle.
                drop(process);
                registry.finish_exit();
            }
        }

        Ok(())
    }

    /// Starts the completion command of `pid`. Chained commands carry no
    /// completion command of their own.
    fn run_completion(registry: &Registry, pid: u32, completion: &str) {
        let command_line = match CommandLine::parse(completion) {
            Ok(command_line) => command_line,
            Err(err) => {
                error!("Invalid completion command for pid {pid} ('{completion}'): {err}");
                return;
            }
        };

        match Self::launch(registry, command_line, None) {
            Ok(handle) => info!(
                "Started completion command for pid {pid} (new pid: {})",
                handle.pid
            ),
            Err(err) => error!("Completion command for pid {pid} failed to start: {err}"),
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Kills `entry` unless it already exited, then reaps it.
fn terminate(entry: &mut TrackedProcess) {
    let pid = entry.pid();
    let child = entry.child_mut();
    if !matches!(child.try_wait(), Ok(Some(_)))
        && let Err(err) = child.kill()
    {
        warn!("Failed to kill process (pid: {pid}): {err}");
    }
    match child.wait() {
        Ok(status) => debug!("Reaped process (pid: {pid}): {status}"),
        Err(err) => error!("Failed to reap process (pid: {pid}): {err}"),
    }
}

/// The child can no longer be waited on, which means something else already
/// reaped it.
#[cfg(unix)]
fn is_unwaitable(error: &io::Error) -> bool {
    error.raw_os_error() == Some(nix::errno::Errno::ECHILD as i32)
}

#[cfg(not(unix))]
fn is_unwaitable(_error: &io::Error) -> bool {
    false
}

fn normalize_completion(completion: Option<String>) -> Option<String> {
    completion.filter(|command| !command.trim().is_empty())
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(unix)]
fn describe_signal(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map(|sig| sig.as_str().to_string())
        .unwrap_or_else(|_| signal.to_string())
}

#[cfg(not(unix))]
fn describe_signal(signal: i32) -> String {
    signal.to_string()
}
