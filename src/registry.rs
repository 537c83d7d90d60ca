//! In-memory table of every process currently under supervision.
use std::{
    collections::HashMap,
    process::Child,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::command::CommandLine;

/// One supervised process. Owns the OS handle until the process is reaped.
#[derive(Debug)]
pub struct TrackedProcess {
    pid: u32,
    child: Child,
    command: CommandLine,
    spawn_label: String,
    completion: Option<String>,
    started_at: DateTime<Utc>,
}

impl TrackedProcess {
    /// Wraps a started child. The pid is read from the handle.
    pub fn new(
        child: Child,
        command: CommandLine,
        spawn_label: String,
        completion: Option<String>,
    ) -> Self {
        Self {
            pid: child.id(),
            child,
            command,
            spawn_label,
            completion,
            started_at: Utc::now(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Command to run once this process exits, if any.
    pub fn completion(&self) -> Option<&str> {
        self.completion.as_deref()
    }

    pub(crate) fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    #[cfg(test)]
    pub(crate) fn set_pid(&mut self, pid: u32) {
        self.pid = pid;
    }

    /// Read-only view handed out to callers.
    pub fn handle(&self) -> ProcessHandle {
        ProcessHandle {
            pid: self.pid,
            program: self.command.program.clone(),
            args: self.command.args.clone(),
            spawn_label: self.spawn_label.clone(),
            completion: self.completion.clone(),
            started_at: self.started_at,
        }
    }
}

/// Snapshot of a tracked process as seen by callers of the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    /// OS-assigned process identifier.
    pub pid: u32,
    /// Executable requested by the caller.
    pub program: String,
    /// Arguments requested by the caller.
    pub args: Vec<String>,
    /// Executable actually handed to the OS.
    pub spawn_label: String,
    /// Completion command configured at start.
    pub completion: Option<String>,
    /// When the process was registered.
    pub started_at: DateTime<Utc>,
}

impl ProcessHandle {
    /// Returns `[program, args...]`.
    pub fn argv(&self) -> Vec<String> {
        CommandLine::new(&self.program, &self.args).argv()
    }
}

/// Mapping from pid to tracked process, guarded by a single mutex.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<HashMap<u32, TrackedProcess>>,
    /// Exited entries already taken out of the table whose completion
    /// command has not been dealt with yet.
    exits_in_flight: AtomicUsize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The map is never left half-updated, so a poisoned lock is still usable.
    pub(crate) fn entries(&self) -> MutexGuard<'_, HashMap<u32, TrackedProcess>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every tracked process, in no particular order.
    pub fn list_all(&self) -> Vec<ProcessHandle> {
        self.entries().values().map(TrackedProcess::handle).collect()
    }

    pub fn lookup(&self, pid: u32) -> Option<ProcessHandle> {
        self.entries().get(&pid).map(TrackedProcess::handle)
    }

    /// Completion command stored for `pid`.
    pub fn completion_for(&self, pid: u32) -> Option<String> {
        self.entries()
            .get(&pid)
            .and_then(|entry| entry.completion.clone())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// True when nothing is tracked and no exit is still being handled.
    pub fn is_idle(&self) -> bool {
        let entries = self.entries();
        entries.is_empty() && self.exits_in_flight.load(Ordering::SeqCst) == 0
    }

    /// Stores `entry` unless its pid is already tracked.
    ///
    /// A duplicate pid leaves the table untouched and hands the rejected
    /// entry back so the caller still owns its child handle.
    pub fn insert(&self, entry: TrackedProcess) -> Result<(), TrackedProcess> {
        let mut entries = self.entries();
        if entries.contains_key(&entry.pid) {
            return Err(entry);
        }

        let pid = entry.pid;
        entries.insert(pid, entry);
        trace!("add() (pid: {pid})");
        Ok(())
    }

    /// Removes `pid` if present. Dropping the entry releases the child handle.
    pub fn remove_entry(&self, pid: u32) -> Option<TrackedProcess> {
        Self::remove_locked(&mut self.entries(), pid)
    }

    /// Takes the entry of a process that was just reaped out of a table the
    /// caller has locked. The pid is free for reuse from here on, so this must
    /// happen under the same lock as the reap. The exit counts as in flight
    /// until [`Registry::finish_exit`] is called.
    pub(crate) fn detach_exited(
        &self,
        entries: &mut HashMap<u32, TrackedProcess>,
        pid: u32,
    ) -> Option<TrackedProcess> {
        let removed = Self::remove_locked(entries, pid);
        if removed.is_some() {
            self.exits_in_flight.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    /// Marks one detached exit as fully handled.
    pub(crate) fn finish_exit(&self) {
        let _ = self
            .exits_in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn remove_locked(
        entries: &mut HashMap<u32, TrackedProcess>,
        pid: u32,
    ) -> Option<TrackedProcess> {
        let removed = entries.remove(&pid);
        if removed.is_some() {
            trace!("remove() (pid: {pid})");
        }
        removed
    }

    /// Empties the table, returning whatever was tracked.
    pub(crate) fn drain(&self) -> Vec<TrackedProcess> {
        self.entries().drain().map(|(_, entry)| entry).collect()
    }
}
