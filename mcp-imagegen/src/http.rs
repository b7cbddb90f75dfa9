//! HTTP job endpoints, served next to `/mcp` on the streamable-HTTP listener.
//!
//! - `GET /jobs/{job_id}` returns the job snapshot
//! - `GET /jobs/{job_id}/events?after={seq}` streams the job's events as
//!   Server-Sent Events and ends after the terminal one. Without `after`, the
//!   `Last-Event-ID` header is used, so reconnecting clients resume where
//!   they stopped.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::dispatcher::Dispatcher;
use crate::error::{ErrorKind, ErrorRecord};
use crate::jobs::{JobId, ProgressEvent};
use crate::session::Session;

pub const LAST_EVENT_ID: &str = "last-event-id";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone)]
struct HttpState {
    dispatcher: Arc<Dispatcher>,
    closing: CancellationToken,
}

/// Routes for job snapshots and event streams.
///
/// Open event streams end when `closing` is cancelled.
pub fn router(dispatcher: Arc<Dispatcher>, closing: CancellationToken) -> Router {
    Router::new()
        .route("/jobs/{job_id}", get(job_snapshot))
        .route("/jobs/{job_id}/events", get(job_events))
        .with_state(HttpState { dispatcher, closing })
}

/// An error response carrying the wire error shape.
#[derive(Debug)]
pub struct ApiError(ErrorRecord);

impl ApiError {
    fn protocol(message: impl Into<String>) -> Self {
        ApiError(ErrorRecord::new(ErrorKind::ProtocolError, message))
    }
}

impl From<crate::error::DispatchError> for ApiError {
    fn from(e: crate::error::DispatchError) -> Self {
        ApiError(e.record())
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest | ErrorKind::ProtocolError => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BackendUnavailable | ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::BackendTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::BackendRejected => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::BackendInternal | ErrorKind::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(self.0.kind), Json(self.0.to_wire())).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    after: Option<String>,
}

#[tracing::instrument(name = "http.job.snapshot", skip(state))]
async fn job_snapshot(State(state): State<HttpState>, Path(job_id): Path<String>) -> Result<Response, ApiError> {
    let job_id = JobId::parse(&job_id)?;
    let snapshot = state.dispatcher.snapshot(job_id)?;
    Ok(Json(snapshot).into_response())
}

#[tracing::instrument(name = "http.job.events", skip(state, headers))]
async fn job_events(
    State(state): State<HttpState>,
    Path(job_id): Path<String>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job_id = JobId::parse(&job_id)?;
    let after = resume_point(query.after.as_deref(), &headers)?;
    let events = state.dispatcher.subscribe(job_id, after)?;

    let session = Session::new();
    let guard = session.open_subscription(job_id);
    info!(session.id = %session.id(), job.id = %job_id, after, "Event stream opened");

    let closing = state.closing.clone();
    let stream = stream::unfold(
        (events, guard, session, closing),
        |(mut events, guard, session, closing)| async move {
            let event = tokio::select! {
                biased;
                _ = closing.cancelled() => None,
                event = events.next() => event,
            };
            match event {
                Some(event) => Some((Ok(sse_event(&event)), (events, guard, session, closing))),
                None => {
                    debug!(session.id = %session.id(), job.id = %guard.job_id(), "Event stream ended");
                    None
                }
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

/// Sequence number to resume after: `after`, else `Last-Event-ID`, else 0.
fn resume_point(after: Option<&str>, headers: &HeaderMap) -> Result<u64, ApiError> {
    if let Some(after) = after {
        return after
            .trim()
            .parse()
            .map_err(|_| ApiError::protocol(format!("invalid 'after' sequence: {:?}", after)));
    }

    match headers.get(LAST_EVENT_ID) {
        None => Ok(0),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .ok_or_else(|| ApiError::protocol("invalid Last-Event-ID header")),
    }
}

fn sse_event(event: &ProgressEvent) -> Event {
    Event::default()
        .id(event.sequence_number.to_string())
        .event(event.kind().as_str())
        .data(serde_json::to_string(event).unwrap_or_default())
}
