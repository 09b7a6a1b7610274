//! Configuration management for taskrelay.
//!
//! Configuration is set via environment variables and validated eagerly;
//! a missing required variable aborts startup before any document is
//! touched:
//! - `API_URL` - Required. Chat-completions endpoint URL.
//! - `API_KEY` - Optional. Bearer token; empty or unset disables the
//!   authorization header.
//! - `PENDING_DIRECTORY` - Required. Directory holding pending tasks.
//! - `COMPLETED_DIRECTORY` - Required. Destination for completed tasks.
//! - `FAILED_DIRECTORY` - Required. Destination for failed tasks.
//! - `REQUEST_TIMEOUT` - Required. Per-request timeout in seconds.
//! - `DEFAULT_MODEL` - Required. Model used when a task names none.
//! - `DEFAULT_WORKSPACE` - Required. Workspace hint used when a task names
//!   none.
//! - `SCAN_INTERVAL` - Optional. Seconds between scanner passes. Defaults
//!   to `300`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat-completions endpoint URL
    pub api_url: String,

    /// Bearer token, attached only when present
    pub api_key: Option<String>,

    /// Pending task set
    pub pending_dir: PathBuf,

    /// Completed task set
    pub completed_dir: PathBuf,

    /// Failed task set
    pub failed_dir: PathBuf,

    /// Timeout for a single inference request
    pub request_timeout: Duration,

    /// Fallback model identifier
    pub default_model: String,

    /// Fallback workspace hint
    pub default_workspace: String,

    /// Time between scanner passes
    pub scan_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` for any absent required
    /// variable, or `ConfigError::InvalidValue` for unparseable durations.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = required("API_URL")?;
        let api_key = std::env::var("API_KEY").ok().filter(|k| !k.is_empty());

        let pending_dir = PathBuf::from(required("PENDING_DIRECTORY")?);
        let completed_dir = PathBuf::from(required("COMPLETED_DIRECTORY")?);
        let failed_dir = PathBuf::from(required("FAILED_DIRECTORY")?);

        let request_timeout = parse_seconds("REQUEST_TIMEOUT", required("REQUEST_TIMEOUT")?)?;

        let default_model = required("DEFAULT_MODEL")?;
        let default_workspace = required("DEFAULT_WORKSPACE")?;

        let scan_interval = match std::env::var("SCAN_INTERVAL") {
            Ok(value) => parse_seconds("SCAN_INTERVAL", value)?,
            Err(_) => Duration::from_secs(300),
        };

        Ok(Self {
            api_url,
            api_key,
            pending_dir,
            completed_dir,
            failed_dir,
            request_timeout,
            default_model,
            default_workspace,
            scan_interval,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        pending_dir: PathBuf,
        completed_dir: PathBuf,
        failed_dir: PathBuf,
        default_model: String,
        default_workspace: String,
    ) -> Self {
        Self {
            api_url,
            api_key,
            pending_dir,
            completed_dir,
            failed_dir,
            request_timeout: Duration::from_secs(300),
            default_model,
            default_workspace,
            scan_interval: Duration::from_secs(300),
        }
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_seconds(name: &str, value: String) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
