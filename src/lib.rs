//! Subman launches external commands as supervised child processes, keeps a
//! registry of the ones still running, and can chain a completion command to
//! run once a process terminates.

/// CLI interface.
pub mod cli;

/// Command-line tokenizing and process creation policy.
pub mod command;

/// Process file configuration.
pub mod config;

/// Error handling.
pub mod error;

/// Registry of live supervised processes.
pub mod registry;

/// Lifecycle supervisor.
pub mod supervisor;

#[doc(hidden)]
pub mod test_utils;

pub use registry::ProcessHandle;
pub use supervisor::{Supervisor, SupervisorConfig};
