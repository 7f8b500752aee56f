//! Configuration management for the task engine.
//!
//! Configuration can be set via environment variables:
//! - `TASK_ENGINE_DEFAULT_MODEL` - Optional. Model identifier recorded when the model service does not report one. Defaults to `anthropic/claude-sonnet-4.5`.
//! - `TASK_ENGINE_CHUNK_TIMEOUT_MS` - Optional. Per-chunk stall bound for model streams. Defaults to `60000`.
//! - `TASK_ENGINE_STRICT_CAPABILITIES` - Optional. Fail runs that declare unknown capabilities. Defaults to `false`.
//! - `TASK_ENGINE_PERSIST_DRAIN_MS` - Optional. How long finalisation waits for a pending step patch. Defaults to `5000`.
//! - `TASK_ENGINE_TASKS_DIR` - Optional. Directory holding task definition files. Defaults to `./tasks`.
//! - `TASK_ENGINE_DATABASE` - Optional. SQLite file for execution records. In-memory store when unset.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fallback model identifier for execution records
    pub default_model: String,

    /// Longest silence tolerated between two model stream events
    pub chunk_timeout: Duration,

    /// Fail resolution outright on unknown capability names
    pub strict_capabilities: bool,

    /// How long finalisation waits for the step journal to flush
    pub persist_drain: Duration,

    /// Task catalogue directory
    pub tasks_dir: PathBuf,

    /// SQLite database for execution records (None = in-memory)
    pub database_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_model: "anthropic/claude-sonnet-4.5".to_string(),
            chunk_timeout: Duration::from_millis(60_000),
            strict_capabilities: false,
            persist_drain: Duration::from_millis(5_000),
            tasks_dir: PathBuf::from("tasks"),
            database_path: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let default_model =
            std::env::var("TASK_ENGINE_DEFAULT_MODEL").unwrap_or(defaults.default_model);

        let chunk_timeout = parse_millis("TASK_ENGINE_CHUNK_TIMEOUT_MS")?
            .unwrap_or(defaults.chunk_timeout);

        let strict_capabilities = std::env::var("TASK_ENGINE_STRICT_CAPABILITIES")
            .ok()
            .map(|v| {
                parse_bool(&v)
                    .map_err(|e| ConfigError::InvalidValue("TASK_ENGINE_STRICT_CAPABILITIES".to_string(), e))
            })
            .transpose()?
            .unwrap_or(defaults.strict_capabilities);

        let persist_drain = parse_millis("TASK_ENGINE_PERSIST_DRAIN_MS")?
            .unwrap_or(defaults.persist_drain);

        let tasks_dir = std::env::var("TASK_ENGINE_TASKS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.tasks_dir);

        let database_path = std::env::var("TASK_ENGINE_DATABASE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            default_model,
            chunk_timeout,
            strict_capabilities,
            persist_drain,
            tasks_dir,
            database_path,
        })
    }

    /// Builder-style toggle for strict capability resolution.
    pub fn with_strict_capabilities(mut self, strict: bool) -> Self {
        self.strict_capabilities = strict;
        self
    }
}

fn parse_millis(var: &str) -> Result<Option<Duration>, ConfigError> {
    let Ok(raw) = std::env::var(var) else {
        return Ok(None);
    };
    let millis: u64 = raw
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(var.to_string(), format!("{}", e)))?;
    if millis == 0 {
        return Err(ConfigError::InvalidValue(
            var.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Some(Duration::from_millis(millis)))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
