//! Command-line interface for subman.
use std::{fmt, str::FromStr};

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::config::DEFAULT_CONFIG_FILE;

/// `--log-level` value. Accepts the names tracing knows ("info", "debug", ...)
/// or their 0-5 shorthands, where 0 turns logging off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    pub fn filter(self) -> LevelFilter {
        self.0
    }
}

impl fmt::Display for LogLevelArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // LevelFilter maps "" to ERROR, which is not what a bare flag should mean.
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("log level cannot be empty".into());
        }

        trimmed.parse::<LevelFilter>().map(LogLevelArg).map_err(|_| {
            format!("invalid log level '{trimmed}' (expected off, error, warn, info, debug, trace or 0-5)")
        })
    }
}

/// Command-line interface for subman.
#[derive(Parser)]
#[command(name = "subman", version, author)]
#[command(about = "Run commands as supervised child processes and chain follow-up commands", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for subman.
#[derive(Subcommand)]
pub enum Commands {
    /// Run one command under supervision and wait until it (and its chain) finishes.
    Run {
        /// Command line to start after the process exits.
        #[arg(long = "then", value_name = "COMMAND")]
        completion: Option<String>,

        /// How often to check children for exit (e.g. "100ms", "1s").
        #[arg(long, value_name = "DURATION")]
        poll_interval: Option<String>,

        /// Program and arguments to execute.
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Start every process listed in a process file and wait until all finish.
    Up {
        /// Path to the process file (defaults to `subman.yaml`).
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: String,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
