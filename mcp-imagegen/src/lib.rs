//! MCP server exposing prompt-to-image generation as tracked jobs.
//!
//! Tool calls are validated and turned into jobs by the [`Dispatcher`]. Each
//! job calls the Gemini Imagen API through a retrying [`GenerationClient`],
//! persists its images in the [`ArtifactStore`] and records an ordered event
//! log in the [`JobTracker`] that clients can replay and follow.

pub mod artifacts;
pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod jobs;
pub mod resources;
pub mod server;
pub mod session;
pub mod tools;

pub use artifacts::{ArtifactRef, ArtifactStore, StorageError};
pub use backend::{GeminiImagenBackend, GeneratedImage, GenerationClient, GenerationError, ImageBackend, RetryPolicy};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, ErrorKind, ErrorRecord};
pub use jobs::{EventBody, EventKind, JobId, JobSnapshot, JobState, JobStats, JobSubscription, JobTracker, ProgressEvent};
pub use server::ImageGenServer;
pub use session::{Session, SessionId};
pub use tools::{GenerateImageParams, ToolCall, ToolRequest};
