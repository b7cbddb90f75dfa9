//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mcp_imagegen::{
    ArtifactStore, Dispatcher, GenerateImageParams, GeneratedImage, GenerationClient, GenerationError,
    ImageBackend, ProgressEvent, RetryPolicy, ToolRequest,
};
use serde_json::json;
use tempfile::TempDir;

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\ntest image";

/// Backend replaying scripted outcomes; the last one repeats.
pub struct ScriptedBackend {
    outcomes: Mutex<VecDeque<Result<usize, GenerationError>>>,
    calls: AtomicU32,
    delay: Duration,
}

impl ScriptedBackend {
    pub fn new(outcomes: Vec<Result<usize, GenerationError>>) -> Arc<Self> {
        Self::with_delay(outcomes, Duration::ZERO)
    }

    pub fn with_delay(outcomes: Vec<Result<usize, GenerationError>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicU32::new(0),
            delay,
        })
    }

    /// Returns `count` images per call.
    pub fn images(count: usize) -> Arc<Self> {
        Self::new(vec![Ok(count)])
    }

    /// Never answers within a test's lifetime.
    pub fn hanging() -> Arc<Self> {
        Self::with_delay(vec![Ok(1)], Duration::from_secs(3600))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<usize, GenerationError> {
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() > 1 {
            outcomes.pop_front().unwrap()
        } else {
            outcomes.front().cloned().unwrap_or(Ok(1))
        }
    }
}

#[async_trait]
impl ImageBackend for ScriptedBackend {
    async fn generate(&self, _params: &GenerateImageParams) -> Result<Vec<GeneratedImage>, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let count = self.next_outcome()?;
        Ok((0..count)
            .map(|_| GeneratedImage {
                bytes: PNG.to_vec(),
                media_type: "image/png".to_string(),
            })
            .collect())
    }
}

/// A dispatcher over `backend` with an artifact store in a fresh temp dir.
pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub backend: Arc<ScriptedBackend>,
    pub dir: TempDir,
}

pub fn harness(backend: Arc<ScriptedBackend>, max_retries: u32) -> Harness {
    harness_with_retention(backend, max_retries, Duration::from_secs(3600))
}

pub fn harness_with_retention(backend: Arc<ScriptedBackend>, max_retries: u32, retention: Duration) -> Harness {
    let dir = TempDir::new().unwrap();
    let client = GenerationClient::new(
        backend.clone(),
        Duration::from_secs(5),
        RetryPolicy::new(max_retries, Duration::from_millis(1)),
    );
    let dispatcher = Dispatcher::new(client, ArtifactStore::new(dir.path().join("artifacts")), retention);
    Harness { dispatcher, backend, dir }
}

pub fn generate_request(prompt: &str) -> ToolRequest {
    ToolRequest::from_value("generate_image", json!({ "prompt": prompt }))
}

/// Drain a subscription to its end.
pub async fn collect(dispatcher: &Dispatcher, job_id: mcp_imagegen::JobId, after: u64) -> Vec<ProgressEvent> {
    let mut events = dispatcher.subscribe(job_id, after).unwrap();
    let mut collected = Vec::new();
    while let Some(event) = events.next().await {
        collected.push(event);
    }
    collected
}
