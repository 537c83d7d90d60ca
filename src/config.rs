//! Configuration management for subman.
use regex::Regex;
use serde::Deserialize;
use std::{collections::BTreeMap, env, fs, path::Path, sync::OnceLock, time::Duration};

use crate::{
    command::CommandLine, error::ConfigError, supervisor::SupervisorConfig,
};

/// Default process file name looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "subman.yaml";

/// Represents the structure of the process file.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Configuration version.
    pub version: String,
    /// Exit-detection cadence (e.g. "250ms", "1s").
    pub poll_interval: Option<String>,
    /// Processes to start, keyed by a name used only in diagnostics.
    #[serde(default)]
    pub processes: BTreeMap<String, ProcessConfig>,
}

/// Configuration for an individual process.
#[derive(Debug, Deserialize, Clone)]
pub struct ProcessConfig {
    /// Command line used to start the process.
    pub command: String,
    /// Command line started once the process exits.
    pub completion: Option<String>,
}

impl ProcessConfig {
    /// Tokenized form of `command`.
    pub fn command_line(&self) -> Result<CommandLine, crate::error::SupervisorError> {
        CommandLine::parse(&self.command)
    }
}

impl Config {
    /// Supervisor tunables derived from this file.
    pub fn supervisor_config(&self) -> Result<SupervisorConfig, ConfigError> {
        let mut config = SupervisorConfig::default();
        if let Some(raw) = &self.poll_interval {
            config.poll_interval = parse_duration(raw)?;
        }
        Ok(config)
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("valid env var pattern")
    })
}

/// Expands `$VAR` and `${VAR}` references from the environment.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let pattern = env_var_pattern();

    if let Some(missing) = pattern
        .captures_iter(input)
        .map(|caps| caps[1].to_string())
        .find(|name| env::var(name).is_err())
    {
        return Err(ConfigError::MissingEnvVar(missing));
    }

    let result = pattern.replace_all(input, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    });
    Ok(result.into_owned())
}

/// Parses a user-facing duration string in the format `<number>[ms|s|m]`.
/// A bare number is read as seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidDuration(raw.to_string()));
    }

    let (amount_str, millis) = if let Some(stripped) = value.strip_suffix("ms") {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1_000)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60_000)
    } else {
        (value, 1_000)
    };

    let amount: u64 = amount_str
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(raw.to_string()))?;
    if amount == 0 {
        return Err(ConfigError::InvalidDuration(raw.to_string()));
    }

    Ok(Duration::from_millis(amount.saturating_mul(millis)))
}

/// Loads and parses the process file, expanding environment variables.
pub fn load_config(config_path: Option<&str>) -> Result<Config, ConfigError> {
    let config_path = Path::new(config_path.unwrap_or(DEFAULT_CONFIG_FILE));

    let content = fs::read_to_string(config_path).map_err(|e| {
        ConfigError::ReadError(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, config_path.display()),
        ))
    })?;

    let expanded_content = expand_env_vars(&content)?;
    let config: Config = serde_yaml::from_str(&expanded_content)?;

    for (name, process) in &config.processes {
        process
            .command_line()
            .map_err(|source| ConfigError::InvalidCommand {
                name: name.clone(),
                source,
            })?;
    }

    Ok(config)
}
