//! Wire-level error taxonomy.
//!
//! Every error that leaves a component is classified into exactly one
//! [`ErrorKind`] and carried as an [`ErrorRecord`]. Nothing else reaches a
//! client, whichever transport it is connected through.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::artifacts::StorageError;
use crate::jobs::JobId;

/// Error kinds visible to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Caller error, never retried.
    InvalidRequest,
    /// Network or credential failure reaching the backend.
    BackendUnavailable,
    /// Backend refused the prompt.
    BackendRejected,
    /// Backend call exceeded its deadline.
    BackendTimeout,
    /// Unexpected backend behaviour.
    BackendInternal,
    /// Generation succeeded but the result could not be stored.
    StorageUnavailable,
    /// Transport framing violation.
    ProtocolError,
    /// Unknown job id or missing artifact.
    NotFound,
    /// Terminal kind of a job that was cancelled on request.
    Cancelled,
}

impl ErrorKind {
    /// Whether the Generation Client retries this kind automatically.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::BackendUnavailable | ErrorKind::BackendTimeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::BackendUnavailable => "BackendUnavailable",
            ErrorKind::BackendRejected => "BackendRejected",
            ErrorKind::BackendTimeout => "BackendTimeout",
            ErrorKind::BackendInternal => "BackendInternal",
            ErrorKind::StorageUnavailable => "StorageUnavailable",
            ErrorKind::ProtocolError => "ProtocolError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified error with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wire form: `{"error": {"kind": ..., "message": ...}}`.
    pub fn to_wire(&self) -> Value {
        json!({ "error": self })
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Errors returned by the Dispatcher's synchronous operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("server is shutting down")]
    ShuttingDown,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            DispatchError::JobNotFound(_) => ErrorKind::NotFound,
            DispatchError::Storage(e) => e.kind(),
            DispatchError::ShuttingDown => ErrorKind::BackendUnavailable,
        }
    }

    pub fn record(&self) -> ErrorRecord {
        ErrorRecord::new(self.kind(), self.to_string())
    }
}
