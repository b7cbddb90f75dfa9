//! MCP server for image generation jobs.
//!
//! This module provides the MCP server handler that exposes:
//! - `generate_image` to generate and wait, streaming progress to the client
//! - `submit_image_job`, `get_job`, `watch_job` and `cancel_job` for
//!   working with jobs asynchronously
//! - Resources for models, jobs and persisted artifacts

use std::sync::Arc;

use base64::Engine;
use rmcp::model::{
    AnnotateAble, CallToolRequestParams, CallToolResult, Content, Implementation, JsonObject,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, LoggingLevel,
    LoggingMessageNotificationParam, PaginatedRequestParams, ProgressNotificationParam, ProgressToken,
    RawResource, RawResourceTemplate, ReadResourceRequestParams, ReadResourceResult, ResourceContents,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{Peer, RequestContext, RoleServer};
use rmcp::{ErrorData as McpError, ServerHandler};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactRef, media_type_for};
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, ErrorKind, ErrorRecord};
use crate::jobs::{EventBody, JobId, JobSubscription, ProgressEvent};
use crate::resources;
use crate::session::{Session, SubscriptionGuard};
use crate::tools::{GENERATE_IMAGE, GenerateImageParams, ToolRequest, input_schema};

pub const SUBMIT_IMAGE_JOB: &str = "submit_image_job";
pub const GET_JOB: &str = "get_job";
pub const WATCH_JOB: &str = "watch_job";
pub const CANCEL_JOB: &str = "cancel_job";

const LOGGER: &str = "mcp-imagegen";

/// Arguments of `get_job` and `cancel_job`.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct JobParams {
    /// Job identifier returned by `submit_image_job` or `generate_image`
    pub job_id: String,
}

/// Arguments of `watch_job`.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WatchJobParams {
    /// Job identifier
    pub job_id: String,
    /// Only return events with a higher sequence number (default: 0, all events)
    #[serde(default)]
    pub after_sequence: u64,
}

/// Forwards job events to the MCP client as notifications.
#[derive(Clone)]
pub struct Notifier {
    peer: Peer<RoleServer>,
    progress_token: Option<ProgressToken>,
}

impl Notifier {
    pub fn new(peer: Peer<RoleServer>, progress_token: Option<ProgressToken>) -> Self {
        Self { peer, progress_token }
    }

    async fn forward(&self, event: &ProgressEvent) {
        let level = match event.body {
            EventBody::Failed { .. } => LoggingLevel::Error,
            _ => LoggingLevel::Info,
        };
        let log = LoggingMessageNotificationParam {
            level,
            logger: Some(LOGGER.to_string()),
            data: serde_json::to_value(event).unwrap_or(Value::Null),
        };
        if let Err(e) = self.peer.notify_logging_message(log).await {
            debug!(error = %e, "Failed to send logging notification");
        }

        if let Some(token) = &self.progress_token {
            let progress = ProgressNotificationParam {
                progress_token: token.clone(),
                progress: event.sequence_number as f64,
                total: None,
                message: Some(event.summary()),
            };
            if let Err(e) = self.peer.notify_progress(progress).await {
                debug!(error = %e, "Failed to send progress notification");
            }
        }
    }
}

/// How following a job ended.
enum Followed {
    /// The job reached its terminal event, which is the last one collected.
    Finished(Vec<ProgressEvent>),
    /// The request was cancelled first, by the client or by its session ending.
    Detached,
}

/// MCP server handler. One instance per client session.
#[derive(Clone)]
pub struct ImageGenServer {
    dispatcher: Arc<Dispatcher>,
    session: Arc<Session>,
    model: String,
}

impl ImageGenServer {
    pub fn new(dispatcher: Arc<Dispatcher>, model: impl Into<String>) -> Self {
        Self {
            dispatcher,
            session: Session::new(),
            model: model.into(),
        }
    }

    /// Handler for a newly connected session, sharing this server's dispatcher.
    pub fn for_new_session(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            session: Session::new(),
            model: self.model.clone(),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Tools advertised to clients.
    pub fn tools() -> Vec<Tool> {
        vec![
            Tool::new(
                GENERATE_IMAGE,
                "Generate images from a text prompt and wait for the result. \
                 Streams progress while the job runs and returns the artifacts \
                 together with the images inline.",
                input_schema::<GenerateImageParams>(),
            ),
            Tool::new(
                SUBMIT_IMAGE_JOB,
                "Start an image generation job and return its id immediately. \
                 Takes the same arguments as generate_image.",
                input_schema::<GenerateImageParams>(),
            ),
            Tool::new(GET_JOB, "Get the current state of a job.", input_schema::<JobParams>()),
            Tool::new(
                WATCH_JOB,
                "Replay a job's events after a sequence number and follow it until it finishes.",
                input_schema::<WatchJobParams>(),
            ),
            Tool::new(
                CANCEL_JOB,
                "Cancel a job and return its final state. Cancelling a finished job has no effect.",
                input_schema::<JobParams>(),
            ),
        ]
    }

    /// Submit a generation job and follow it to the end.
    pub async fn generate_image(
        &self,
        arguments: JsonObject,
        notifier: Option<Notifier>,
        ct: CancellationToken,
    ) -> CallToolResult {
        let request = ToolRequest::new(GENERATE_IMAGE, arguments).with_session(self.session.id());
        let job_id = match self.dispatcher.submit(request) {
            Ok(job_id) => job_id,
            Err(e) => return error_result(&e.record()),
        };
        info!(session.id = %self.session.id(), job.id = %job_id, "Generating image");

        let events = match self.dispatcher.subscribe(job_id, 0) {
            Ok(events) => events,
            Err(e) => return error_result(&e.record()),
        };
        let guard = self.session.open_subscription(job_id);

        let terminal = match follow(events, &guard, notifier.as_ref(), &ct).await {
            Followed::Finished(mut events) => events.pop(),
            Followed::Detached => return detached_result(job_id),
        };

        match terminal.map(|event| event.body) {
            Some(EventBody::Completed { artifacts }) => self.completed_result(job_id, artifacts).await,
            Some(EventBody::Failed { error }) => error_result(&error),
            _ => error_result(&ErrorRecord::new(
                ErrorKind::BackendInternal,
                format!("job {} ended without a result", job_id),
            )),
        }
    }

    /// Submit a generation job without waiting for it.
    pub fn submit_image_job(&self, arguments: JsonObject) -> CallToolResult {
        let request = ToolRequest::new(GENERATE_IMAGE, arguments).with_session(self.session.id());
        let submitted = self
            .dispatcher
            .submit(request)
            .and_then(|job_id| self.dispatcher.snapshot(job_id));

        match submitted {
            Ok(snapshot) => {
                info!(session.id = %self.session.id(), job.id = %snapshot.job_id, "Image job submitted");
                CallToolResult::structured(json!({ "job_id": snapshot.job_id, "state": snapshot.state }))
            }
            Err(e) => error_result(&e.record()),
        }
    }

    pub fn get_job(&self, arguments: JsonObject) -> CallToolResult {
        let snapshot = parse_args::<JobParams>(arguments)
            .and_then(|params| JobId::parse(&params.job_id))
            .and_then(|job_id| self.dispatcher.snapshot(job_id));
        match snapshot {
            Ok(snapshot) => json_result(&snapshot),
            Err(e) => error_result(&e.record()),
        }
    }

    /// Replay events after `after_sequence` and follow the job until it finishes.
    pub async fn watch_job(
        &self,
        arguments: JsonObject,
        notifier: Option<Notifier>,
        ct: CancellationToken,
    ) -> CallToolResult {
        let subscribed = parse_args::<WatchJobParams>(arguments).and_then(|params| {
            let job_id = JobId::parse(&params.job_id)?;
            Ok((job_id, self.dispatcher.subscribe(job_id, params.after_sequence)?))
        });
        let (job_id, events) = match subscribed {
            Ok(subscribed) => subscribed,
            Err(e) => return error_result(&e.record()),
        };
        let guard = self.session.open_subscription(job_id);

        match follow(events, &guard, notifier.as_ref(), &ct).await {
            Followed::Finished(events) => {
                let snapshot = self.dispatcher.snapshot(job_id).ok();
                CallToolResult::structured(json!({
                    "job_id": job_id,
                    "events": events,
                    "snapshot": snapshot,
                }))
            }
            Followed::Detached => detached_result(job_id),
        }
    }

    pub async fn cancel_job(&self, arguments: JsonObject) -> CallToolResult {
        let job_id = match parse_args::<JobParams>(arguments).and_then(|params| JobId::parse(&params.job_id)) {
            Ok(job_id) => job_id,
            Err(e) => return error_result(&e.record()),
        };
        info!(session.id = %self.session.id(), job.id = %job_id, "Cancelling job");

        match self.dispatcher.cancel(job_id).await {
            Ok(snapshot) => json_result(&snapshot),
            Err(e) => error_result(&e.record()),
        }
    }

    async fn completed_result(&self, job_id: JobId, artifacts: Vec<ArtifactRef>) -> CallToolResult {
        let mut images = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            match self.dispatcher.fetch_artifact(artifact).await {
                Ok(bytes) => images.push(Content::image(
                    base64::engine::general_purpose::STANDARD.encode(&bytes),
                    artifact.media_type.clone(),
                )),
                Err(e) => return error_result(&e.record()),
            }
        }

        let mut result = CallToolResult::structured(json!({ "job_id": job_id, "artifacts": artifacts }));
        result.content.extend(images);
        result
    }

    fn resources(&self) -> Vec<rmcp::model::Resource> {
        let mut models = RawResource::new(resources::MODELS_URI, "Available Image Models");
        models.description = Some("Image generation models and their request limits".to_string());
        models.mime_type = Some("application/json".to_string());

        let mut jobs = RawResource::new(resources::JOBS_URI, "Image Jobs");
        jobs.description = Some("Job statistics and the state of every tracked job".to_string());
        jobs.mime_type = Some("application/json".to_string());

        let mut listed = vec![models.no_annotation(), jobs.no_annotation()];
        for snapshot in self.dispatcher.list_jobs() {
            for artifact in snapshot.artifacts {
                let mut resource = RawResource::new(resources::artifact_uri(&artifact.key), artifact.key.clone());
                resource.mime_type = Some(artifact.media_type);
                resource.size = u32::try_from(artifact.size_bytes).ok();
                listed.push(resource.no_annotation());
            }
        }
        listed
    }

    async fn read_artifact(&self, uri: &str) -> Result<ResourceContents, McpError> {
        let key = resources::artifact_key(uri)
            .ok_or_else(|| McpError::resource_not_found(format!("Unknown resource: {}", uri), None))?;

        let bytes = self.dispatcher.artifact(key).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => McpError::resource_not_found(format!("Unknown resource: {}", uri), None),
            _ => McpError::internal_error(e.to_string(), None),
        })?;

        Ok(ResourceContents::BlobResourceContents {
            uri: uri.to_string(),
            mime_type: Some(media_type_for(key).to_string()),
            blob: base64::engine::general_purpose::STANDARD.encode(&bytes),
            meta: None,
        })
    }
}

/// Collect a job's events until its terminal one, forwarding each to the client.
async fn follow(
    mut events: JobSubscription,
    guard: &SubscriptionGuard,
    notifier: Option<&Notifier>,
    ct: &CancellationToken,
) -> Followed {
    let mut collected = Vec::new();
    loop {
        let event = tokio::select! {
            biased;
            _ = ct.cancelled() => {
                debug!(job.id = %guard.job_id(), "Request cancelled, subscription ended");
                return Followed::Detached;
            }
            event = events.next() => event,
        };

        let Some(event) = event else {
            return Followed::Finished(collected);
        };
        if let Some(notifier) = notifier {
            notifier.forward(&event).await;
        }
        let terminal = event.is_terminal();
        collected.push(event);
        if terminal {
            return Followed::Finished(collected);
        }
    }
}

fn parse_args<T: DeserializeOwned>(arguments: JsonObject) -> Result<T, DispatchError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| DispatchError::InvalidRequest(format!("Invalid parameters: {}", e)))
}

fn json_result<T: Serialize>(value: &T) -> CallToolResult {
    match serde_json::to_value(value) {
        Ok(value) => CallToolResult::structured(value),
        Err(e) => error_result(&ErrorRecord::new(ErrorKind::BackendInternal, e.to_string())),
    }
}

fn error_result(record: &ErrorRecord) -> CallToolResult {
    CallToolResult::structured_error(record.to_wire())
}

fn detached_result(job_id: JobId) -> CallToolResult {
    error_result(&ErrorRecord::new(
        ErrorKind::Cancelled,
        format!("stopped following job {}; the job keeps running", job_id),
    ))
}

impl ServerHandler for ImageGenServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Image generation server backed by the Gemini Imagen API. \
                 Use generate_image to generate and wait, or submit_image_job \
                 with get_job, watch_job and cancel_job to work asynchronously. \
                 Generated images are readable as artifact:// resources."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_logging()
                .build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move { Ok(ListToolsResult::with_all_items(Self::tools())) }
    }

    fn call_tool(
        &self,
        params: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let arguments = params.arguments.unwrap_or_default();
            let notifier = Notifier::new(context.peer.clone(), context.meta.get_progress_token());

            let result = match params.name.as_ref() {
                GENERATE_IMAGE => self.generate_image(arguments, Some(notifier), context.ct.clone()).await,
                SUBMIT_IMAGE_JOB => self.submit_image_job(arguments),
                GET_JOB => self.get_job(arguments),
                WATCH_JOB => self.watch_job(arguments, Some(notifier), context.ct.clone()).await,
                CANCEL_JOB => self.cancel_job(arguments).await,
                _ => return Err(McpError::invalid_params(format!("Unknown tool: {}", params.name), None)),
            };

            if result.is_error == Some(true) {
                warn!(session.id = %self.session.id(), tool = %params.name, "Tool call failed");
            }
            Ok(result)
        }
    }

    fn list_resources(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        async move {
            debug!("Listing resources");
            Ok(ListResourcesResult::with_all_items(self.resources()))
        }
    }

    fn list_resource_templates(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourceTemplatesResult, McpError>> + Send + '_ {
        async move {
            let template = RawResourceTemplate {
                uri_template: resources::ARTIFACT_URI_TEMPLATE.to_string(),
                name: "Generated Image".to_string(),
                title: None,
                description: Some("A persisted image of a completed job, as base64".to_string()),
                mime_type: None,
                icons: None,
            };
            Ok(ListResourceTemplatesResult::with_all_items(vec![template.no_annotation()]))
        }
    }

    fn read_resource(
        &self,
        params: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            let uri = params.uri;
            debug!(uri = %uri, "Reading resource");

            let contents = match uri.as_str() {
                resources::MODELS_URI => json_contents(resources::models_resource_json(&self.model), &uri),
                resources::JOBS_URI => json_contents(
                    resources::jobs_resource_json(&self.dispatcher.stats(), &self.dispatcher.list_jobs()),
                    &uri,
                ),
                _ => self.read_artifact(&uri).await?,
            };

            Ok(ReadResourceResult { contents: vec![contents] })
        }
    }
}

fn json_contents(text: String, uri: &str) -> ResourceContents {
    ResourceContents::TextResourceContents {
        uri: uri.to_string(),
        mime_type: Some("application/json".to_string()),
        text,
        meta: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::backend::{GeneratedImage, GenerationClient, GenerationError, ImageBackend, RetryPolicy};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

    struct FixedBackend(Result<usize, GenerationError>);

    #[async_trait]
    impl ImageBackend for FixedBackend {
        async fn generate(&self, _params: &GenerateImageParams) -> Result<Vec<GeneratedImage>, GenerationError> {
            let count = self.0.clone()?;
            Ok((0..count)
                .map(|_| GeneratedImage {
                    bytes: PNG.to_vec(),
                    media_type: "image/png".to_string(),
                })
                .collect())
        }
    }

    fn server(backend: FixedBackend) -> (ImageGenServer, TempDir) {
        let dir = TempDir::new().unwrap();
        let client = GenerationClient::new(
            Arc::new(backend),
            Duration::from_secs(5),
            RetryPolicy::new(0, Duration::from_millis(1)),
        );
        let dispatcher = Dispatcher::new(client, ArtifactStore::new(dir.path()), Duration::from_secs(60));
        (ImageGenServer::new(dispatcher, "imagen-4.0-generate-001"), dir)
    }

    fn args(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => panic!("arguments must be an object"),
        }
    }

    #[tokio::test]
    async fn test_get_info_enables_tools_resources_and_logging() {
        let (server, _dir) = server(FixedBackend(Ok(1)));
        let info = server.get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_some());
        assert!(info.capabilities.logging.is_some());
        assert_eq!(info.server_info.name, "mcp-imagegen");
    }

    #[test]
    fn test_tools_are_listed_with_schemas() {
        let tools = ImageGenServer::tools();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_ref()).collect();
        assert_eq!(names, vec![GENERATE_IMAGE, SUBMIT_IMAGE_JOB, GET_JOB, WATCH_JOB, CANCEL_JOB]);
        assert!(tools[0].input_schema.contains_key("properties"));
    }

    #[tokio::test]
    async fn test_generate_image_returns_artifacts_and_inline_images() {
        let (server, _dir) = server(FixedBackend(Ok(2)));
        let result = server
            .generate_image(args(json!({"prompt": "a cat", "number_of_images": 2})), None, CancellationToken::new())
            .await;

        assert_eq!(result.is_error, Some(false));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["artifacts"].as_array().unwrap().len(), 2);
        assert_eq!(structured["artifacts"][0]["size_bytes"], PNG.len());
        // JSON text plus one image per artifact.
        assert_eq!(result.content.len(), 3);
        assert!(result.content[1].as_image().is_some());
    }

    #[tokio::test]
    async fn test_generate_image_rejects_invalid_arguments() {
        let (server, _dir) = server(FixedBackend(Ok(1)));
        let result = server
            .generate_image(args(json!({"prompt": "  "})), None, CancellationToken::new())
            .await;

        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.structured_content.unwrap()["error"]["kind"], "InvalidRequest");
        assert!(server.dispatcher().list_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_generate_image_reports_backend_failure() {
        let (server, _dir) = server(FixedBackend(Err(GenerationError::Rejected("blocked".into()))));
        let result = server
            .generate_image(args(json!({"prompt": "a cat"})), None, CancellationToken::new())
            .await;

        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.structured_content.unwrap()["error"]["kind"], "BackendRejected");
    }

    #[tokio::test]
    async fn test_cancelled_request_detaches_without_cancelling_job() {
        let (server, _dir) = server(FixedBackend(Ok(1)));
        let ct = CancellationToken::new();
        ct.cancel();
        let result = server.generate_image(args(json!({"prompt": "a cat"})), None, ct).await;

        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.structured_content.unwrap()["error"]["kind"], "Cancelled");
        let job_id = server.dispatcher().list_jobs()[0].job_id;
        let snapshot = server.dispatcher().cancel(job_id).await.unwrap();
        assert!(snapshot.state.is_terminal());
        assert!(server.session().open_subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_submit_then_watch_and_get() {
        let (server, _dir) = server(FixedBackend(Ok(1)));
        let submitted = server
            .submit_image_job(args(json!({"prompt": "a cat"})))
            .structured_content
            .unwrap();
        let job_id = submitted["job_id"].as_str().unwrap().to_string();

        let watched = server
            .watch_job(args(json!({"job_id": job_id})), None, CancellationToken::new())
            .await
            .structured_content
            .unwrap();
        let events = watched["events"].as_array().unwrap();
        assert_eq!(events.first().unwrap()["kind"], "started");
        assert_eq!(events.last().unwrap()["kind"], "completed");
        assert_eq!(watched["snapshot"]["state"], "completed");

        let snapshot = server.get_job(args(json!({"job_id": job_id}))).structured_content.unwrap();
        assert_eq!(snapshot["state"], "completed");
    }

    #[tokio::test]
    async fn test_get_job_errors() {
        let (server, _dir) = server(FixedBackend(Ok(1)));

        let malformed = server.get_job(args(json!({"job_id": "nope"})));
        assert_eq!(malformed.structured_content.unwrap()["error"]["kind"], "InvalidRequest");

        let unknown = server.get_job(args(json!({"job_id": JobId::new().to_string()})));
        assert_eq!(unknown.structured_content.unwrap()["error"]["kind"], "NotFound");

        let extra = server.get_job(args(json!({"job_id": JobId::new().to_string(), "x": 1})));
        assert_eq!(extra.structured_content.unwrap()["error"]["kind"], "InvalidRequest");
    }

    #[tokio::test]
    async fn test_cancel_job_on_finished_job_is_unchanged() {
        let (server, _dir) = server(FixedBackend(Ok(1)));
        let done = server
            .generate_image(args(json!({"prompt": "a cat"})), None, CancellationToken::new())
            .await
            .structured_content
            .unwrap();
        let job_id = done["job_id"].as_str().unwrap().to_string();

        let cancelled = server.cancel_job(args(json!({"job_id": job_id}))).await;
        assert_eq!(cancelled.structured_content.unwrap()["state"], "completed");
    }

    #[tokio::test]
    async fn test_resources_list_artifacts_and_read_blob() {
        let (server, _dir) = server(FixedBackend(Ok(1)));
        let done = server
            .generate_image(args(json!({"prompt": "a cat"})), None, CancellationToken::new())
            .await
            .structured_content
            .unwrap();
        let key = done["artifacts"][0]["ref"].as_str().unwrap().to_string();

        let listed: Vec<String> = server.resources().into_iter().map(|r| r.raw.uri).collect();
        assert!(listed.contains(&resources::MODELS_URI.to_string()));
        assert!(listed.contains(&resources::JOBS_URI.to_string()));
        assert!(listed.contains(&resources::artifact_uri(&key)));

        match server.read_artifact(&resources::artifact_uri(&key)).await.unwrap() {
            ResourceContents::BlobResourceContents { blob, mime_type, .. } => {
                assert_eq!(mime_type.as_deref(), Some("image/png"));
                assert_eq!(base64::engine::general_purpose::STANDARD.decode(blob).unwrap(), PNG);
            }
            other => panic!("expected blob contents, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_unknown_artifact_is_not_found() {
        let (server, _dir) = server(FixedBackend(Ok(1)));
        let uri = resources::artifact_uri(&format!("{}/image-0.png", JobId::new()));
        assert!(server.read_artifact(&uri).await.is_err());
        assert!(server.read_artifact("image://nope").await.is_err());
    }

    #[tokio::test]
    async fn test_new_session_shares_dispatcher() {
        let (server, _dir) = server(FixedBackend(Ok(1)));
        let other = server.for_new_session();
        assert_ne!(server.session().id(), other.session().id());
        assert!(Arc::ptr_eq(server.dispatcher(), other.dispatcher()));
    }
}
