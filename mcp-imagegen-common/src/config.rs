//! Configuration module for loading environment variables, flags and settings.
//!
//! The server is configured once at start-up. Values come from command-line
//! flags (see [`ConfigArgs`]), which fall back to environment variables, which
//! may in turn be provided by a `.env` file in the working directory.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Args;

use crate::error::ConfigError;

/// Default image generation model.
pub const DEFAULT_MODEL: &str = "imagen-4.0-generate-001";

/// Default base URL of the Gemini API.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default directory for generated artifacts.
pub const DEFAULT_ARTIFACT_DIR: &str = "./artifacts";

pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_JOB_RETENTION_SECS: u64 = 3600;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Environment variable holding the backend credential.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Application configuration, fully resolved.
#[derive(Clone)]
pub struct Config {
    /// Backend model identifier
    pub model: String,
    /// Backend credential (Gemini API key)
    pub api_key: String,
    /// Base URL of the backend API, without a trailing slash
    pub api_base_url: String,
    /// Root directory of the artifact store
    pub artifact_dir: PathBuf,
    /// Deadline for a single backend call
    pub generation_timeout: Duration,
    /// Automatic retries for retryable backend failures
    pub max_retries: u32,
    /// First retry delay; doubles on each further retry
    pub retry_base_delay: Duration,
    /// How long finished jobs stay queryable
    pub job_retention: Duration,
    /// How long in-flight jobs may run after shutdown starts
    pub shutdown_grace: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("artifact_dir", &self.artifact_dir)
            .field("generation_timeout", &self.generation_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("job_retention", &self.job_retention)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables and .env file.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingEnvVar` if GEMINI_API_KEY is not set, and
    /// `ConfigError::InvalidValue` if a numeric setting cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::missing_env_var(API_KEY_VAR))?;

        let model = lookup("MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_base_url =
            lookup("GEMINI_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let artifact_dir = lookup("ARTIFACT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR));

        let timeout_secs = parse_var(&lookup, "GENERATION_TIMEOUT_SECS", DEFAULT_GENERATION_TIMEOUT_SECS)?;
        let max_retries = parse_var(&lookup, "MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let retry_ms = parse_var(&lookup, "RETRY_BASE_DELAY_MS", DEFAULT_RETRY_BASE_DELAY_MS)?;
        let retention_secs = parse_var(&lookup, "JOB_RETENTION_SECS", DEFAULT_JOB_RETENTION_SECS)?;
        let grace_secs = parse_var(&lookup, "SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE_SECS)?;

        let config = Self {
            model,
            api_key,
            api_base_url: trim_base_url(api_base_url),
            artifact_dir,
            generation_timeout: Duration::from_secs(timeout_secs),
            max_retries,
            retry_base_delay: Duration::from_millis(retry_ms),
            job_retention: Duration::from_secs(retention_secs),
            shutdown_grace: Duration::from_secs(grace_secs),
        };
        config.validate()?;
        Ok(config)
    }

    /// Get the Gemini API `predict` endpoint URL for a given model.
    pub fn generate_endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:predict", self.api_base_url, model)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid_value("MODEL", "model identifier cannot be empty"));
        }
        if self.generation_timeout.is_zero() {
            return Err(ConfigError::invalid_value(
                "GENERATION_TIMEOUT_SECS",
                "timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Load a `.env` file if one is present (ignore errors if not found).
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid_value(name, format!("'{}': {}", raw, e))),
    }
}

fn trim_base_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Command-line arguments for the backend, storage and job settings.
///
/// Every flag falls back to the environment variable of the same meaning,
/// so the server can be configured entirely through its environment.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Model used for image generation
    #[arg(long, env = "MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// API key for the Gemini API
    #[arg(long, env = API_KEY_VAR, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the Gemini API
    #[arg(long, env = "GEMINI_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_base_url: String,

    /// Directory where generated images are written
    #[arg(long, env = "ARTIFACT_DIR", default_value = DEFAULT_ARTIFACT_DIR)]
    pub artifact_dir: PathBuf,

    /// Deadline for a single backend call, in seconds
    #[arg(long, env = "GENERATION_TIMEOUT_SECS", default_value_t = DEFAULT_GENERATION_TIMEOUT_SECS)]
    pub generation_timeout_secs: u64,

    /// Automatic retries for transient backend failures
    #[arg(long, env = "MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Initial retry backoff, in milliseconds
    #[arg(long, env = "RETRY_BASE_DELAY_MS", default_value_t = DEFAULT_RETRY_BASE_DELAY_MS)]
    pub retry_base_delay_ms: u64,

    /// How long finished jobs remain queryable, in seconds
    #[arg(long, env = "JOB_RETENTION_SECS", default_value_t = DEFAULT_JOB_RETENTION_SECS)]
    pub job_retention_secs: u64,

    /// Grace period for in-flight jobs on shutdown, in seconds
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = DEFAULT_SHUTDOWN_GRACE_SECS)]
    pub shutdown_grace_secs: u64,
}

impl ConfigArgs {
    /// Convert parsed arguments into a validated [`Config`].
    ///
    /// # Errors
    /// Returns `ConfigError::MissingEnvVar` if no API key was supplied.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::missing_env_var(API_KEY_VAR))?;

        let config = Config {
            model: self.model,
            api_key,
            api_base_url: trim_base_url(self.api_base_url),
            artifact_dir: self.artifact_dir,
            generation_timeout: Duration::from_secs(self.generation_timeout_secs),
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            job_retention: Duration::from_secs(self.job_retention_secs),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        };
        config.validate()?;
        Ok(config)
    }
}
