//! Error handling for subman.
use thiserror::Error;

/// Defines all possible errors that can occur while supervising processes.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The OS refused to create the process (missing executable, permissions, limits).
    #[error("Failed to start command '{command}': {source}")]
    SpawnError {
        /// The executable that failed to start.
        command: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// No executable was supplied.
    #[error("No command specified to run")]
    EmptyCommand,

    /// A command line could not be split into an argument vector.
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),

    /// The OS handed out a pid that is still registered to another process.
    /// The new process was killed and reaped.
    #[error("Process id {0} is already tracked")]
    DuplicatePid(u32),

    /// Error for poisoned mutex.
    #[error("Mutex is poisoned: {0}")]
    MutexPoisonError(String),
}

/// Implement the `From` trait to convert a `std::sync::PoisonError` into a `SupervisorError`.
impl<T> From<std::sync::PoisonError<T>> for SupervisorError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SupervisorError::MutexPoisonError(err.to_string())
    }
}

/// Error type for loading a process file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading or accessing a configuration file.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A `${VAR}` reference named a variable that is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// A duration value could not be parsed.
    #[error("Invalid duration value: '{0}'")]
    InvalidDuration(String),

    /// A process entry has no usable command.
    #[error("Process '{name}' has an invalid command: {source}")]
    InvalidCommand {
        /// The process entry name.
        name: String,
        /// Why the command was rejected.
        #[source]
        source: SupervisorError,
    },
}
