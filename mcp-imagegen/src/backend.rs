//! Generation Client: typed adapter around the remote image model.
//!
//! [`ImageBackend`] performs exactly one round-trip. [`GenerationClient`]
//! layers the per-call timeout, bounded retries with exponential backoff and
//! cancellation on top, and reports every attempt to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use mcp_imagegen_common::config::Config;
use mcp_imagegen_common::error::Error;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{ErrorKind, ErrorRecord};
use crate::tools::GenerateImageParams;

/// Media type requested from the backend.
pub const OUTPUT_MIME_TYPE: &str = "image/png";

/// Per-request deadline used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Upper bound for a single backoff delay.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// One image returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// Classified backend failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("image backend unavailable: {0}")]
    Unavailable(String),

    #[error("image backend rejected the request: {0}")]
    Rejected(String),

    #[error("image backend timed out: {0}")]
    Timeout(String),

    #[error("image backend error: {0}")]
    Internal(String),

    #[error("generation cancelled")]
    Cancelled,
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Unavailable(_) => ErrorKind::BackendUnavailable,
            GenerationError::Rejected(_) => ErrorKind::BackendRejected,
            GenerationError::Timeout(_) => ErrorKind::BackendTimeout,
            GenerationError::Internal(_) => ErrorKind::BackendInternal,
            GenerationError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn record(&self) -> ErrorRecord {
        ErrorRecord::new(self.kind(), self.to_string())
    }
}

impl From<Error> for GenerationError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match &err {
            Error::Api { status_code, .. } => match status_code {
                0 | 401 | 403 | 429 | 502 | 503 => GenerationError::Unavailable(message),
                408 | 504 => GenerationError::Timeout(message),
                400 => GenerationError::Rejected(message),
                _ => GenerationError::Internal(message),
            },
            Error::Timeout(_) => GenerationError::Timeout(message),
            Error::Config(_) => GenerationError::Unavailable(message),
        }
    }
}

/// One backend round-trip, without retries.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(&self, params: &GenerateImageParams) -> Result<Vec<GeneratedImage>, GenerationError>;
}

// =============================================================================
// Gemini API (Imagen predict) backend
// =============================================================================

/// Imagen predict request.
#[derive(Debug, Serialize)]
pub struct ImagenRequest {
    pub instances: Vec<ImagenInstance>,
    pub parameters: ImagenParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagenInstance {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagenParameters {
    pub sample_count: u32,
    pub aspect_ratio: String,
    pub image_size: String,
    pub person_generation: String,
    pub output_options: OutputOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputOptions {
    pub mime_type: String,
}

/// Imagen predict response.
#[derive(Debug, Deserialize)]
pub struct ImagenResponse {
    #[serde(default)]
    pub predictions: Vec<ImagenPrediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagenPrediction {
    pub bytes_base64_encoded: Option<String>,
    pub mime_type: Option<String>,
}

impl ImagenRequest {
    pub fn from_params(params: &GenerateImageParams) -> Self {
        Self {
            instances: vec![ImagenInstance {
                prompt: params.prompt.clone(),
                negative_prompt: params.negative_prompt.clone(),
            }],
            parameters: ImagenParameters {
                sample_count: params.number_of_images,
                aspect_ratio: params.aspect_ratio.as_str().to_string(),
                image_size: params.image_size.as_str().to_string(),
                person_generation: params.person_generation.as_str().to_string(),
                output_options: OutputOptions {
                    mime_type: OUTPUT_MIME_TYPE.to_string(),
                },
            },
        }
    }
}

/// Backend calling the Gemini API `predict` endpoint of an Imagen model.
pub struct GeminiImagenBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    request_timeout: Duration,
}

impl GeminiImagenBackend {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            reqwest::Client::new(),
            config.generate_endpoint(&config.model),
            config.api_key.clone(),
        )
        .with_request_timeout(config.generation_timeout)
    }

    /// Deadline for one HTTP round-trip, body included.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            Error::timeout(self.request_timeout).into()
        } else {
            Error::api(&self.endpoint, 0, format!("Request failed: {}", e)).into()
        }
    }

    fn decode(&self, response: ImagenResponse) -> Result<Vec<GeneratedImage>, GenerationError> {
        let mut images = Vec::with_capacity(response.predictions.len());
        for (index, prediction) in response.predictions.into_iter().enumerate() {
            let Some(data) = prediction.bytes_base64_encoded else {
                debug!(index, "Prediction without image data skipped");
                continue;
            };
            let bytes = BASE64.decode(data.as_bytes()).map_err(|e| {
                GenerationError::Internal(format!("prediction {} is not valid base64: {}", index, e))
            })?;
            images.push(GeneratedImage {
                bytes,
                media_type: prediction
                    .mime_type
                    .unwrap_or_else(|| OUTPUT_MIME_TYPE.to_string()),
            });
        }
        if images.is_empty() {
            return Err(GenerationError::Internal("No images were generated".to_string()));
        }
        Ok(images)
    }
}

#[async_trait]
impl ImageBackend for GeminiImagenBackend {
    #[instrument(level = "debug", skip_all, fields(endpoint = %self.endpoint, count = params.number_of_images))]
    async fn generate(&self, params: &GenerateImageParams) -> Result<Vec<GeneratedImage>, GenerationError> {
        let request = ImagenRequest::from_params(params);

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(&self.endpoint, status.as_u16(), body).into());
        }

        let api_response: ImagenResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.request_error(e)
            } else {
                GenerationError::Internal(format!("Failed to parse response: {}", e))
            }
        })?;

        let images = self.decode(api_response)?;
        debug!(count = images.len(), "Received images from API");
        Ok(images)
    }
}

// =============================================================================
// Retrying client
// =============================================================================

/// Bounded retries with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Total attempts allowed, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retrying after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent).min(MAX_RETRY_DELAY)
    }
}

/// A backend attempt about to be made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub number: u32,
    pub max: u32,
}

/// Backend wrapper enforcing timeout, retries and cancellation.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn ImageBackend>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn ImageBackend>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            backend,
            timeout,
            retry,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(GeminiImagenBackend::from_config(config)),
            config.generation_timeout,
            RetryPolicy::new(config.max_retries, config.retry_base_delay),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Generate images, retrying transient failures.
    ///
    /// `on_attempt` runs before every backend call. The final error kind is
    /// returned unchanged once retries are exhausted. Cancellation stops
    /// waiting immediately and yields [`GenerationError::Cancelled`].
    pub async fn generate<F>(
        &self,
        params: &GenerateImageParams,
        cancel: &CancellationToken,
        mut on_attempt: F,
    ) -> Result<Vec<GeneratedImage>, GenerationError>
    where
        F: FnMut(Attempt) + Send,
    {
        let max = self.retry.max_attempts();
        let mut number = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            on_attempt(Attempt { number, max });

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                result = tokio::time::timeout(self.timeout, self.backend.generate(params)) => {
                    result.unwrap_or_else(|_| Err(Error::timeout(self.timeout).into()))
                }
            };

            match outcome {
                Ok(images) => {
                    info!(attempt = number, count = images.len(), "Generation succeeded");
                    return Ok(images);
                }
                Err(e) if e.kind().is_retryable() && number < max => {
                    let delay = self.retry.delay_for(number);
                    warn!(attempt = number, kind = %e.kind(), error = %e, ?delay, "Retrying generation");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    number += 1;
                }
                Err(e) => {
                    warn!(attempt = number, kind = %e.kind(), error = %e, "Generation failed");
                    return Err(e);
                }
            }
        }
    }
}
