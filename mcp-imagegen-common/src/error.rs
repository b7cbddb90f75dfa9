//! Error types for the common library.
//!
//! This module provides the low-level error hierarchy shared by the server
//! crates. These errors describe *what went wrong* in a component; the image
//! server classifies them into its wire-level error taxonomy before they cross
//! into the dispatcher or a transport.
//!
//! # Error Categories
//!
//! - `ConfigError`: Missing or invalid configuration
//! - `Error::Api`: Remote API errors (includes endpoint and status)
//! - `Error::Timeout`: Remote calls that exceeded their deadline

use std::time::Duration;

use thiserror::Error;

/// Maximum number of characters of a remote response body kept in an error message.
pub const MAX_BODY_EXCERPT: usize = 512;

/// Unified error type for the common library.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (missing env vars, invalid values)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// API errors with endpoint and HTTP status context
    ///
    /// A status code of `0` means no HTTP response was received at all
    /// (connection refused, DNS failure, TLS error).
    #[error("API error for {endpoint} (HTTP {status_code}): {message}")]
    Api {
        /// The API endpoint that was called
        endpoint: String,
        /// HTTP status code returned by the API
        status_code: u16,
        /// Error message from the API or describing the failure
        message: String,
    },

    /// A remote call got no response within its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Create a new API error with endpoint, status code, and message.
    ///
    /// Long messages (typically raw response bodies) are cut down to
    /// [`MAX_BODY_EXCERPT`] characters.
    ///
    /// # Example
    ///
    /// ```
    /// use mcp_imagegen_common::error::Error;
    ///
    /// let err = Error::api(
    ///     "https://api.example.com/v1/models/m:predict",
    ///     500,
    ///     "Internal server error"
    /// );
    /// assert!(err.to_string().contains("api.example.com"));
    /// assert!(err.to_string().contains("500"));
    /// ```
    pub fn api(endpoint: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Error::Api {
            endpoint: endpoint.into(),
            status_code,
            message: excerpt(message.into()),
        }
    }

    /// Create a new timeout error for a call that waited `after`.
    pub fn timeout(after: Duration) -> Self {
        Error::Timeout(after)
    }
}

fn excerpt(message: String) -> String {
    if message.chars().count() <= MAX_BODY_EXCERPT {
        return message;
    }
    let mut cut: String = message.chars().take(MAX_BODY_EXCERPT).collect();
    cut.push_str("...");
    cut
}

/// Configuration errors.
///
/// These errors occur when loading or validating configuration from
/// environment variables or command-line flags.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("Required environment variable {0} is not set")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl ConfigError {
    /// Create a new missing environment variable error.
    pub fn missing_env_var(name: impl Into<String>) -> Self {
        ConfigError::MissingEnvVar(name.into())
    }

    /// Create a new invalid value error.
    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue(name.into(), reason.into())
    }
}

/// Result type alias using the unified Error type.
pub type Result<T> = std::result::Result<T, Error>;
