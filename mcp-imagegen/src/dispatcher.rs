//! Dispatcher: validates tool calls, runs jobs and exposes their events.
//!
//! Both transports go through this one interface. `submit` returns as soon
//! as the job is registered; the backend call runs on a tracked task that is
//! the job's only writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mcp_imagegen_common::config::Config;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, info, info_span, warn};

use crate::artifacts::{ArtifactRef, ArtifactStore};
use crate::backend::{GenerationClient, GenerationError};
use crate::error::DispatchError;
use crate::jobs::{JobId, JobSnapshot, JobStats, JobSubscription, JobTracker, JobWriter};
use crate::tools::{GenerateImageParams, ToolCall, ToolRequest};

/// Longest pause between two eviction sweeps.
const MAX_REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Orchestration hub tying the tracker, backend client and store together.
pub struct Dispatcher {
    tracker: Arc<JobTracker>,
    client: GenerationClient,
    store: ArtifactStore,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    accepting: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher and start evicting expired jobs in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(client: GenerationClient, store: ArtifactStore, retention: Duration) -> Arc<Self> {
        let tracker = Arc::new(JobTracker::new(retention));
        let shutdown = CancellationToken::new();
        let interval = (retention / 4).clamp(Duration::from_millis(100), MAX_REAPER_INTERVAL);
        tracker.spawn_reaper(interval, shutdown.child_token());

        Arc::new(Self {
            tracker,
            client,
            store,
            tasks: TaskTracker::new(),
            shutdown,
            accepting: AtomicBool::new(true),
        })
    }

    pub fn from_config(config: &Config) -> Arc<Self> {
        Self::new(
            GenerationClient::from_config(config),
            ArtifactStore::new(&config.artifact_dir),
            config.job_retention,
        )
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Validate a tool call, register a `Pending` job and start it.
    ///
    /// Never waits on the backend.
    pub fn submit(&self, request: ToolRequest) -> Result<JobId, DispatchError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(DispatchError::ShuttingDown);
        }

        let call = ToolCall::parse(&request)?;
        let tool = call.tool_name();
        let (job_id, writer) = self.tracker.create(request);

        match call {
            ToolCall::GenerateImage(params) => {
                let span = info_span!("job", job.id = %job_id, job.tool = tool);
                self.tasks.spawn(
                    run_generation(self.client.clone(), self.store.clone(), params, writer).instrument(span),
                );
            }
        }

        Ok(job_id)
    }

    /// Events of a job after `after_sequence` (0 replays everything).
    pub fn subscribe(&self, job_id: JobId, after_sequence: u64) -> Result<JobSubscription, DispatchError> {
        let snapshot = self.snapshot(job_id)?;
        if after_sequence > snapshot.last_sequence {
            return Err(DispatchError::InvalidRequest(format!(
                "sequence {} is ahead of job {} (last sequence {})",
                after_sequence, job_id, snapshot.last_sequence
            )));
        }
        self.tracker
            .subscribe(job_id, after_sequence)
            .ok_or(DispatchError::JobNotFound(job_id))
    }

    /// Request cancellation and wait for the job's terminal state.
    ///
    /// If the job already finished, its state is returned unchanged.
    pub async fn cancel(&self, job_id: JobId) -> Result<JobSnapshot, DispatchError> {
        let entry = self
            .tracker
            .get(job_id)
            .ok_or(DispatchError::JobNotFound(job_id))?;

        if !entry.state().is_terminal() {
            info!(job.id = %job_id, "Cancellation requested");
            entry.cancel_token().cancel();
        }

        let mut events = entry.subscribe(0);
        while events.next().await.is_some() {}
        Ok(entry.snapshot())
    }

    pub fn snapshot(&self, job_id: JobId) -> Result<JobSnapshot, DispatchError> {
        self.tracker
            .snapshot(job_id)
            .ok_or(DispatchError::JobNotFound(job_id))
    }

    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        self.tracker.list()
    }

    pub fn stats(&self) -> JobStats {
        self.tracker.stats()
    }

    /// Bytes of a persisted artifact, by store key.
    pub async fn artifact(&self, key: &str) -> Result<Vec<u8>, DispatchError> {
        Ok(self.store.fetch_key(key).await?)
    }

    pub async fn fetch_artifact(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, DispatchError> {
        Ok(self.store.fetch(artifact).await?)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop accepting work, give in-flight jobs `grace` to finish, then cancel them.
    pub async fn shutdown(&self, grace: Duration) {
        self.accepting.store(false, Ordering::Release);
        self.tasks.close();
        info!(in_flight = self.tasks.len(), ?grace, "Dispatcher shutting down");

        if tokio::time::timeout(grace, self.tasks.wait()).await.is_err() {
            let cancelled = self.tracker.cancel_all();
            warn!(cancelled, "Grace period elapsed, cancelling in-flight jobs");
            self.tasks.wait().await;
        }

        self.shutdown.cancel();
        info!("Dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Stops the reaper.
        self.shutdown.cancel();
    }
}

/// Body of one `generate_image` job. Owns the job's writer.
async fn run_generation(
    client: GenerationClient,
    store: ArtifactStore,
    params: GenerateImageParams,
    mut writer: JobWriter,
) {
    let cancel = writer.cancel_token().clone();
    let requested = params.number_of_images;

    let result = client
        .generate(&params, &cancel, |attempt| {
            if attempt.number == 1 {
                writer.start(format!("Generating {} image(s)", requested));
            } else {
                writer.progress(
                    format!("Retrying generation (attempt {}/{})", attempt.number, attempt.max),
                    Some(attempt.number),
                );
            }
        })
        .await;

    let images = match result {
        Ok(images) => images,
        Err(GenerationError::Cancelled) => {
            writer.cancelled();
            return;
        }
        Err(e) => {
            writer.fail(e.record());
            return;
        }
    };

    // Past this point the backend has produced the images; cancellation is
    // no longer honoured.
    writer.progress(format!("Persisting {} image(s)", images.len()), None);

    let job_id = writer.job_id();
    let mut artifacts = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        match store.persist(job_id, index, &image.bytes, &image.media_type).await {
            Ok(artifact) => artifacts.push(artifact),
            Err(e) => {
                store.discard(job_id).await;
                writer.fail(e.record());
                return;
            }
        }
    }

    writer.complete(artifacts);
}
