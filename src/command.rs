//! Command-line tokenizing and the fixed process creation policy.
use std::{
    env, fmt,
    path::PathBuf,
    process::{Command, Stdio},
};

use crate::error::SupervisorError;

/// An executable plus its ordered argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Executable name or path.
    pub program: String,
    /// Arguments passed after the executable.
    pub args: Vec<String>,
}

impl CommandLine {
    /// Builds a command line from already separated parts.
    pub fn new<S: AsRef<str>>(program: &str, args: &[S]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.as_ref().to_string()).collect(),
        }
    }

    /// Splits a single command string using shell-like quoting rules.
    ///
    /// Unquoted whitespace separates tokens; single and double quotes keep
    /// embedded whitespace together. The first token becomes the program.
    pub fn parse(line: &str) -> Result<Self, SupervisorError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(SupervisorError::EmptyCommand);
        }

        let mut parts = shlex::split(trimmed)
            .ok_or_else(|| SupervisorError::CommandParse(trimmed.to_string()))?;
        if parts.is_empty() {
            return Err(SupervisorError::EmptyCommand);
        }

        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }

    /// Returns `[program, args...]`.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A `Command` ready to spawn together with the executable actually handed to the OS.
pub struct PreparedCommand {
    /// The command with the creation policy applied.
    pub command: Command,
    /// Executable the OS is asked to run (the interpreter on Windows).
    pub spawn_label: String,
}

/// Applies the creation policy to `command_line`.
///
/// The child runs in the caller's current directory with all standard streams
/// discarded and stays in the parent's process group. On Windows the command
/// goes through `%ComSpec% /c` so shell built-ins and `.bat`/`.cmd` files
/// resolve the way users expect.
pub fn build(command_line: &CommandLine) -> PreparedCommand {
    #[cfg(windows)]
    let (mut command, spawn_label) = {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;

        let interpreter = env::var("ComSpec").unwrap_or_else(|_| "cmd.exe".to_string());
        let mut command = Command::new(&interpreter);
        command
            .arg("/c")
            .arg(&command_line.program)
            .args(&command_line.args)
            .creation_flags(CREATE_NO_WINDOW);
        (command, interpreter)
    };

    #[cfg(not(windows))]
    let (mut command, spawn_label) = {
        let mut command = Command::new(&command_line.program);
        command.args(&command_line.args);
        (command, command_line.program.clone())
    };

    if let Some(dir) = current_dir() {
        command.current_dir(dir);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    PreparedCommand {
        command,
        spawn_label,
    }
}

fn current_dir() -> Option<PathBuf> {
    env::current_dir().ok()
}
