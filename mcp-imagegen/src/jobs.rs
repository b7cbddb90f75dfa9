//! Job Tracker: in-memory registry of generation jobs and their event logs.
//!
//! Each job has exactly one writer, the [`JobWriter`] handed out by
//! [`JobTracker::create`]. Everything else reads: snapshots, subscriptions and
//! the registry itself. A job's events are kept in an append-only log; a
//! `watch` channel carrying the latest sequence number wakes subscribers, so
//! the writer never waits on a reader and a slow reader simply catches up
//! from the log.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::artifacts::ArtifactRef;
use crate::error::{DispatchError, ErrorKind, ErrorRecord};
use crate::tools::ToolRequest;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }

    /// Parse a client-supplied id.
    pub fn parse(raw: &str) -> Result<Self, DispatchError> {
        raw.parse()
            .map_err(|_| DispatchError::InvalidRequest(format!("malformed job id '{}'", raw)))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(JobId)
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Progress,
    Completed,
    Failed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Progress => "progress",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
        }
    }
}

/// Kind and payload of a [`ProgressEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum EventBody {
    Started {
        message: String,
    },
    Progress {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attempt: Option<u32>,
    },
    Completed {
        artifacts: Vec<ArtifactRef>,
    },
    Failed {
        error: ErrorRecord,
    },
}

impl EventBody {
    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::Started { .. } => EventKind::Started,
            EventBody::Progress { .. } => EventKind::Progress,
            EventBody::Completed { .. } => EventKind::Completed,
            EventBody::Failed { .. } => EventKind::Failed,
        }
    }
}

/// One ordered notification about a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub sequence_number: u64,
    #[serde(flatten)]
    pub body: EventBody,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind(), EventKind::Completed | EventKind::Failed)
    }

    /// Short human-readable description, used for MCP notifications.
    pub fn summary(&self) -> String {
        match &self.body {
            EventBody::Started { message } | EventBody::Progress { message, .. } => message.clone(),
            EventBody::Completed { artifacts } => {
                format!("Generated {} image(s)", artifacts.len())
            }
            EventBody::Failed { error } => error.to_string(),
        }
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub tool: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub artifacts: Vec<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    pub last_sequence: u64,
}

/// Counts of tracked jobs per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

struct JobRecord {
    state: JobState,
    last_update: DateTime<Utc>,
    artifacts: Vec<ArtifactRef>,
    error: Option<ErrorRecord>,
    events: Vec<ProgressEvent>,
    finished_at: Option<Instant>,
}

pub(crate) struct JobEntry {
    id: JobId,
    request: ToolRequest,
    created_at: DateTime<Utc>,
    cancel: CancellationToken,
    record: Mutex<JobRecord>,
    latest: watch::Sender<u64>,
}

// A panic while holding the lock leaves the record consistent (every
// mutation is a single push or assignment), so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl JobEntry {
    fn new(request: ToolRequest) -> Self {
        let now = Utc::now();
        let (latest, _) = watch::channel(0);
        Self {
            id: JobId::new(),
            request,
            created_at: now,
            cancel: CancellationToken::new(),
            record: Mutex::new(JobRecord {
                state: JobState::Pending,
                last_update: now,
                artifacts: Vec::new(),
                error: None,
                events: Vec::new(),
                finished_at: None,
            }),
            latest,
        }
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn state(&self) -> JobState {
        lock(&self.record).state
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        let record = lock(&self.record);
        JobSnapshot {
            job_id: self.id,
            tool: self.request.tool_name.clone(),
            state: record.state,
            created_at: self.created_at,
            last_update: record.last_update,
            artifacts: record.artifacts.clone(),
            error: record.error.clone(),
            last_sequence: record.events.len() as u64,
        }
    }

    pub(crate) fn subscribe(self: &Arc<Self>, after_sequence: u64) -> JobSubscription {
        JobSubscription {
            entry: Arc::clone(self),
            rx: self.latest.subscribe(),
            next_after: after_sequence,
            done: false,
            buffer: VecDeque::new(),
        }
    }

    /// Events after `after`, and whether the job has reached a terminal state.
    fn events_after(&self, after: u64) -> (Vec<ProgressEvent>, bool) {
        let record = lock(&self.record);
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(record.events.len());
        (record.events[start..].to_vec(), record.state.is_terminal())
    }

    fn append(&self, body: EventBody, state: Option<JobState>) -> u64 {
        let sequence = {
            let mut record = lock(&self.record);
            let now = Utc::now();
            let sequence = record.events.len() as u64 + 1;
            if let Some(state) = state {
                record.state = state;
                if state.is_terminal() {
                    record.finished_at = Some(Instant::now());
                }
            }
            match &body {
                EventBody::Completed { artifacts } => record.artifacts = artifacts.clone(),
                EventBody::Failed { error } => record.error = Some(error.clone()),
                _ => {}
            }
            record.last_update = now;
            record.events.push(ProgressEvent {
                job_id: self.id,
                sequence_number: sequence,
                body,
                timestamp: now,
            });
            sequence
        };
        self.latest.send_replace(sequence);
        sequence
    }

    fn expired(&self, now: Instant, retention: Duration) -> bool {
        let record = lock(&self.record);
        record
            .finished_at
            .is_some_and(|finished| now.saturating_duration_since(finished) >= retention)
    }
}

/// The single write handle of a job.
///
/// Terminal transitions consume the writer, so no event can follow a terminal
/// one. Dropping a writer that never reached a terminal state records a
/// synthetic `failed` event.
pub struct JobWriter {
    entry: Arc<JobEntry>,
    finished: bool,
}

impl JobWriter {
    pub fn job_id(&self) -> JobId {
        self.entry.id
    }

    /// Cancellation signal for this job.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.entry.cancel
    }

    /// `Pending -> Running`, on the first backend attempt.
    pub fn start(&mut self, message: impl Into<String>) {
        if self.entry.state() != JobState::Pending {
            return;
        }
        self.entry.append(
            EventBody::Started {
                message: message.into(),
            },
            Some(JobState::Running),
        );
        tracing::info!(job.id = %self.entry.id, "Job started");
    }

    pub fn progress(&mut self, message: impl Into<String>, attempt: Option<u32>) {
        self.entry.append(
            EventBody::Progress {
                message: message.into(),
                attempt,
            },
            None,
        );
    }

    pub fn complete(mut self, artifacts: Vec<ArtifactRef>) -> JobSnapshot {
        let count = artifacts.len();
        self.finish(JobState::Completed, EventBody::Completed { artifacts });
        tracing::info!(job.id = %self.entry.id, artifacts = count, "Job completed");
        self.entry.snapshot()
    }

    pub fn fail(mut self, error: ErrorRecord) -> JobSnapshot {
        tracing::error!(job.id = %self.entry.id, kind = %error.kind, error = %error.message, "Job failed");
        self.finish(JobState::Failed, EventBody::Failed { error });
        self.entry.snapshot()
    }

    /// Terminal transition for an honoured cancellation request.
    pub fn cancelled(mut self) -> JobSnapshot {
        let error = ErrorRecord::new(ErrorKind::Cancelled, "job cancelled on request");
        self.finish(JobState::Cancelled, EventBody::Failed { error });
        tracing::info!(job.id = %self.entry.id, "Job cancelled");
        self.entry.snapshot()
    }

    fn finish(&mut self, state: JobState, body: EventBody) {
        self.finished = true;
        self.entry.append(body, Some(state));
    }
}

impl Drop for JobWriter {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(job.id = %self.entry.id, "Job writer dropped before a terminal state");
            let error = ErrorRecord::new(ErrorKind::BackendInternal, "job aborted before completion");
            self.finish(JobState::Failed, EventBody::Failed { error });
        }
    }
}

/// A restartable, finite sequence of one job's events.
///
/// Yields every event with a sequence number greater than the starting point,
/// in order, and ends after the terminal event.
pub struct JobSubscription {
    entry: Arc<JobEntry>,
    rx: watch::Receiver<u64>,
    next_after: u64,
    done: bool,
    buffer: VecDeque<ProgressEvent>,
}

impl JobSubscription {
    pub fn job_id(&self) -> JobId {
        self.entry.id
    }

    /// Sequence number of the last event handed out (or the starting point).
    pub fn last_sequence(&self) -> u64 {
        self.next_after
    }

    /// Next event, waiting for one if necessary. `None` after the terminal event.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                self.next_after = event.sequence_number;
                if event.is_terminal() {
                    self.done = true;
                    self.buffer.clear();
                }
                return Some(event);
            }
            if self.done {
                return None;
            }

            // Mark the current version seen before reading the log, so an
            // append racing with the read still wakes `changed` below.
            self.rx.borrow_and_update();
            let (pending, terminal) = self.entry.events_after(self.next_after);
            if !pending.is_empty() {
                self.buffer.extend(pending);
                continue;
            }
            if terminal {
                // Resumed at or past the terminal event.
                self.done = true;
                return None;
            }

            if self.rx.changed().await.is_err() {
                // The sender lives in the entry we hold, so this is unreachable
                // short of runtime teardown.
                self.done = true;
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription.next().await.map(|event| (event, subscription))
        })
    }
}

/// Registry of in-flight and recently finished jobs.
pub struct JobTracker {
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
    retention: Duration,
}

impl JobTracker {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Register a new `Pending` job and hand out its writer.
    pub fn create(&self, request: ToolRequest) -> (JobId, JobWriter) {
        let entry = Arc::new(JobEntry::new(request));
        let id = entry.id;
        tracing::info!(
            job.id = %id,
            job.tool = %entry.request.tool_name,
            session.id = ?entry.request.session_id,
            "Job created"
        );
        write(&self.jobs).insert(id, Arc::clone(&entry));
        (
            id,
            JobWriter {
                entry,
                finished: false,
            },
        )
    }

    pub(crate) fn get(&self, id: JobId) -> Option<Arc<JobEntry>> {
        read(&self.jobs).get(&id).cloned()
    }

    pub fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        self.get(id).map(|entry| entry.snapshot())
    }

    /// Subscribe to a job's events after `after_sequence` (0 for all).
    pub fn subscribe(&self, id: JobId, after_sequence: u64) -> Option<JobSubscription> {
        self.get(id).map(|entry| entry.subscribe(after_sequence))
    }

    /// All tracked jobs, oldest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let entries: Vec<Arc<JobEntry>> = read(&self.jobs).values().cloned().collect();
        let mut snapshots: Vec<JobSnapshot> = entries.iter().map(|e| e.snapshot()).collect();
        snapshots.sort_by_key(|s| s.created_at);
        snapshots
    }

    pub fn stats(&self) -> JobStats {
        let entries: Vec<Arc<JobEntry>> = read(&self.jobs).values().cloned().collect();
        let mut stats = JobStats {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries {
            match entry.state() {
                JobState::Pending => stats.pending += 1,
                JobState::Running => stats.running += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Remove terminal jobs older than the retention window.
    ///
    /// Subscriptions already holding an evicted job keep reading its log up
    /// to the terminal event.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut jobs = write(&self.jobs);
        let before = jobs.len();
        jobs.retain(|_, entry| !entry.expired(now, self.retention));
        let evicted = before - jobs.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = jobs.len(), "Evicted expired jobs");
        }
        evicted
    }

    /// Periodically evict expired jobs until `shutdown` is cancelled.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        tracker.evict_expired();
                    }
                }
            }
        })
    }

    /// Signal cancellation to every job that has not finished.
    pub fn cancel_all(&self) -> usize {
        let entries: Vec<Arc<JobEntry>> = read(&self.jobs).values().cloned().collect();
        let mut cancelled = 0;
        for entry in entries {
            if !entry.state().is_terminal() {
                entry.cancel.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn tracker() -> JobTracker {
        JobTracker::new(Duration::from_secs(60))
    }

    fn request() -> ToolRequest {
        ToolRequest::from_value("generate_image", json!({"prompt": "a red fox"}))
    }

    fn artifact(job_id: JobId) -> ArtifactRef {
        ArtifactRef {
            key: format!("{}/image-0.png", job_id),
            media_type: "image/png".into(),
            size_bytes: 4,
            created_at: Utc::now(),
        }
    }

    async fn collect(subscription: JobSubscription) -> Vec<ProgressEvent> {
        subscription.into_stream().collect().await
    }

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()).unwrap(), id);
        assert!(matches!(
            JobId::parse("not-a-uuid"),
            Err(DispatchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_new_job_is_pending() {
        let tracker = tracker();
        let (id, _writer) = tracker.create(request());
        let snapshot = tracker.snapshot(id).unwrap();
        assert_eq!(snapshot.state, JobState::Pending);
        assert_eq!(snapshot.tool, "generate_image");
        assert_eq!(snapshot.last_sequence, 0);
    }

    #[tokio::test]
    async fn test_lifecycle_events_are_sequenced() {
        let tracker = tracker();
        let (id, mut writer) = tracker.create(request());
        let subscription = tracker.subscribe(id, 0).unwrap();

        writer.start("attempt 1");
        writer.progress("persisting", None);
        writer.complete(vec![artifact(id)]);

        let events = collect(subscription).await;
        let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::Started, EventKind::Progress, EventKind::Completed]);
        let sequences: Vec<_> = events.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequences, vec![1, 2, 3]);

        let snapshot = tracker.snapshot(id).unwrap();
        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.artifacts.len(), 1);
    }

    #[tokio::test]
    async fn test_start_only_once() {
        let tracker = tracker();
        let (id, mut writer) = tracker.create(request());
        writer.start("attempt 1");
        writer.start("attempt 2");
        assert_eq!(tracker.snapshot(id).unwrap().last_sequence, 1);
    }

    #[tokio::test]
    async fn test_subscription_resumes_after_sequence() {
        let tracker = tracker();
        let (id, mut writer) = tracker.create(request());
        writer.start("attempt 1");
        writer.progress("retrying", Some(2));
        writer.fail(ErrorRecord::new(ErrorKind::BackendTimeout, "deadline exceeded"));

        let events = collect(tracker.subscribe(id, 2).unwrap()).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence_number, 3);
        assert!(events[0].is_terminal());
    }

    #[tokio::test]
    async fn test_live_subscriber_sees_events_appended_later() {
        let tracker = Arc::new(tracker());
        let (id, mut writer) = tracker.create(request());
        let subscription = tracker.subscribe(id, 0).unwrap();
        let reader = tokio::spawn(collect(subscription));

        tokio::task::yield_now().await;
        writer.start("attempt 1");
        tokio::task::yield_now().await;
        writer.complete(vec![]);

        let events = reader.await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind(), EventKind::Completed);
    }

    #[tokio::test]
    async fn test_dropped_writer_emits_synthetic_failure() {
        let tracker = tracker();
        let (id, mut writer) = tracker.create(request());
        writer.start("attempt 1");
        drop(writer);

        let events = collect(tracker.subscribe(id, 0).unwrap()).await;
        let last = events.last().unwrap();
        assert!(last.is_terminal());
        match &last.body {
            EventBody::Failed { error } => assert_eq!(error.kind, ErrorKind::BackendInternal),
            other => panic!("expected failed event, got {other:?}"),
        }
        assert_eq!(tracker.snapshot(id).unwrap().state, JobState::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_terminal_event() {
        let tracker = tracker();
        let (id, writer) = tracker.create(request());
        let snapshot = writer.cancelled();
        assert_eq!(snapshot.state, JobState::Cancelled);
        assert_eq!(snapshot.error.as_ref().unwrap().kind, ErrorKind::Cancelled);

        let events = collect(tracker.subscribe(id, 0).unwrap()).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_after_retention_only_for_terminal_jobs() {
        let tracker = tracker();
        let (done_id, writer) = tracker.create(request());
        let (running_id, mut running) = tracker.create(request());
        running.start("attempt 1");
        writer.complete(vec![]);

        let late_subscriber = tracker.subscribe(done_id, 0).unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(tracker.evict_expired(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(tracker.evict_expired(), 1);
        assert!(tracker.snapshot(done_id).is_none());
        assert!(tracker.snapshot(running_id).is_some());

        // A subscription taken before eviction still ends with the terminal event.
        let events = collect(late_subscriber).await;
        assert_eq!(events.last().unwrap().kind(), EventKind::Completed);
    }

    #[tokio::test]
    async fn test_resuming_past_terminal_event_ends_immediately() {
        let tracker = tracker();
        let (id, writer) = tracker.create(request());
        writer.complete(vec![]);

        let mut subscription = tracker.subscribe(id, 1).unwrap();
        assert!(subscription.next().await.is_none());
        let mut subscription = tracker.subscribe(id, 99).unwrap();
        assert!(subscription.next().await.is_none());
    }

    #[test]
    fn test_stats_and_list() {
        let tracker = tracker();
        let (_, mut a) = tracker.create(request());
        let (_, b) = tracker.create(request());
        let (_, _c) = tracker.create(request());
        a.start("attempt 1");
        b.fail(ErrorRecord::new(ErrorKind::BackendRejected, "policy"));

        let stats = tracker.stats();
        assert_eq!(
            stats,
            JobStats {
                total: 3,
                pending: 1,
                running: 1,
                completed: 0,
                failed: 1,
                cancelled: 0,
            }
        );
        assert_eq!(tracker.list().len(), 3);
    }

    #[test]
    fn test_cancel_all_skips_terminal_jobs() {
        let tracker = tracker();
        let (_, a) = tracker.create(request());
        let (_, b) = tracker.create(request());
        b.complete(vec![]);
        assert_eq!(tracker.cancel_all(), 1);
        assert!(a.cancel_token().is_cancelled());
    }

    #[test]
    fn test_event_wire_format() {
        let id = JobId::new();
        let event = ProgressEvent {
            job_id: id,
            sequence_number: 2,
            body: EventBody::Progress {
                message: "retrying".into(),
                attempt: Some(2),
            },
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["job_id"], json!(id.to_string()));
        assert_eq!(value["sequence_number"], 2);
        assert_eq!(value["kind"], "progress");
        assert_eq!(value["payload"]["attempt"], 2);
    }
}
