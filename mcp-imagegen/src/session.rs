//! Per-client session bookkeeping.
//!
//! A session tracks which jobs its client is currently following. A
//! subscription lives as long as the request or stream that opened it: when a
//! client goes away, the transport cancels its in-flight requests (rmcp
//! cancels every request's `RequestContext::ct` once the session's service
//! stops) or drops its event stream. The jobs themselves keep running.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::jobs::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A connected client's context.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    // Job id -> number of open subscriptions to it.
    subscriptions: Mutex<HashMap<JobId, usize>>,
}

impl Session {
    pub fn new() -> Arc<Self> {
        let session = Arc::new(Self {
            id: SessionId::new(),
            subscriptions: Mutex::new(HashMap::new()),
        });
        tracing::debug!(session.id = %session.id, "Session opened");
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Register a subscription to `job_id`; it stays open until the guard drops.
    pub fn open_subscription(self: &Arc<Self>, job_id: JobId) -> SubscriptionGuard {
        *self.lock().entry(job_id).or_insert(0) += 1;
        SubscriptionGuard {
            session: Arc::downgrade(self),
            job_id,
        }
    }

    /// Jobs this session currently follows.
    pub fn open_subscriptions(&self) -> Vec<JobId> {
        self.lock().keys().copied().collect()
    }

    fn release(&self, job_id: JobId) {
        let mut subscriptions = self.lock();
        if let Some(count) = subscriptions.get_mut(&job_id) {
            *count -= 1;
            if *count == 0 {
                subscriptions.remove(&job_id);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, usize>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::debug!(session.id = %self.id, open = self.lock().len(), "Session ended");
    }
}

/// An open subscription of a session to one job.
pub struct SubscriptionGuard {
    session: Weak<Session>,
    job_id: JobId,
}

impl SubscriptionGuard {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.upgrade() {
            session.release(self.job_id);
        }
    }
}
