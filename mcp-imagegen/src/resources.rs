//! MCP resources.
//!
//! - `image://models` - image models the server knows about
//! - `image://jobs` - tracker statistics and job snapshots
//! - `artifact://{job_id}/{file}` - persisted images, read as base64 blobs

use serde::Serialize;
use serde_json::json;

use crate::jobs::{JobSnapshot, JobStats};
use crate::tools::{AspectRatio, MAX_NUMBER_OF_IMAGES, MAX_PROMPT_LENGTH};

pub const MODELS_URI: &str = "image://models";
pub const JOBS_URI: &str = "image://jobs";
pub const ARTIFACT_SCHEME: &str = "artifact://";
pub const ARTIFACT_URI_TEMPLATE: &str = "artifact://{job_id}/{file}";

/// Imagen models served by the Gemini API.
pub const KNOWN_MODELS: &[&str] = &[
    "imagen-4.0-generate-001",
    "imagen-4.0-ultra-generate-001",
    "imagen-4.0-fast-generate-001",
];

/// Information about an image generation model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    /// Whether this is the model the server generates with
    pub is_default: bool,
    pub max_prompt_length: usize,
    pub supported_aspect_ratios: Vec<&'static str>,
    pub supported_image_sizes: Vec<&'static str>,
    pub max_images: u32,
}

fn model_info(id: &str, configured: &str) -> ModelInfo {
    ModelInfo {
        id: id.to_string(),
        is_default: id == configured,
        max_prompt_length: MAX_PROMPT_LENGTH,
        supported_aspect_ratios: AspectRatio::ALL.iter().map(|r| r.as_str()).collect(),
        supported_image_sizes: vec!["1K", "2K"],
        max_images: MAX_NUMBER_OF_IMAGES,
    }
}

/// Known models, with the configured one flagged; a configured model outside
/// the known list is listed too.
pub fn list_models(configured: &str) -> Vec<ModelInfo> {
    let mut models: Vec<ModelInfo> = KNOWN_MODELS.iter().map(|id| model_info(id, configured)).collect();
    if !KNOWN_MODELS.contains(&configured) {
        models.push(model_info(configured, configured));
    }
    models
}

pub fn models_resource_json(configured: &str) -> String {
    serde_json::to_string_pretty(&list_models(configured)).unwrap_or_else(|_| "[]".to_string())
}

pub fn jobs_resource_json(stats: &JobStats, jobs: &[JobSnapshot]) -> String {
    serde_json::to_string_pretty(&json!({ "stats": stats, "jobs": jobs }))
        .unwrap_or_else(|_| "{}".to_string())
}

/// Store key of an `artifact://` URI.
pub fn artifact_key(uri: &str) -> Option<&str> {
    uri.strip_prefix(ARTIFACT_SCHEME).filter(|key| !key.is_empty())
}

pub fn artifact_uri(key: &str) -> String {
    format!("{}{}", ARTIFACT_SCHEME, key)
}
