//! MCP server builder utilities.
//!
//! [`McpServerBuilder`] runs a `ServerHandler` over the selected transport and
//! stops on a shutdown signal. The handler is produced by a factory so that
//! each MCP session (one for stdio, one per `initialize` over HTTP) gets its
//! own handler instance.
//!
//! # Example
//!
//! ```ignore
//! use mcp_imagegen_common::server::McpServerBuilder;
//! use mcp_imagegen_common::transport::Transport;
//!
//! McpServerBuilder::new(handler)
//!     .with_session_factory(|h| h.for_new_session())
//!     .with_transport(Transport::stdio())
//!     .run()
//!     .await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use rmcp::{ServerHandler, ServiceExt};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::transport::Transport;

/// Path the MCP endpoint is served under for the HTTP transport.
pub const MCP_PATH: &str = "/mcp";

/// Errors that can occur when running an MCP server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("Failed to bind to {addr}: {message}")]
    BindFailed { addr: SocketAddr, message: String },

    /// Transport error during communication
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server was shut down
    #[error("Server shutdown")]
    Shutdown,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

type SessionFactory<H> = Arc<dyn Fn() -> H + Send + Sync>;

/// Builder for configuring and running MCP servers.
pub struct McpServerBuilder<H> {
    factory: SessionFactory<H>,
    transport: Transport,
    routes: axum::Router,
    shutdown_rx: Option<oneshot::Receiver<()>>,
}

impl<H> McpServerBuilder<H>
where
    H: ServerHandler + Clone + Send + Sync + 'static,
{
    /// Create a new server builder. Every session gets a clone of `handler`
    /// unless a session factory is installed.
    pub fn new(handler: H) -> Self {
        Self {
            factory: Arc::new(move || handler.clone()),
            transport: Transport::default(),
            routes: axum::Router::new(),
            shutdown_rx: None,
        }
    }

    /// Derive each session's handler from the template handler.
    pub fn with_session_factory<F>(mut self, derive: F) -> Self
    where
        F: Fn(&H) -> H + Send + Sync + 'static,
    {
        let template = (self.factory)();
        self.factory = Arc::new(move || derive(&template));
        self
    }

    /// Set the transport mode for the server.
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Serve extra routes next to the MCP endpoint (HTTP transport only).
    pub fn with_routes(mut self, routes: axum::Router) -> Self {
        self.routes = self.routes.merge(routes);
        self
    }

    /// Set a shutdown signal receiver for graceful shutdown.
    ///
    /// When the sender is dropped or a message is sent, the server
    /// will initiate graceful shutdown.
    pub fn with_shutdown(mut self, shutdown_rx: oneshot::Receiver<()>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Run the MCP server with the configured transport.
    ///
    /// Returns once the peer disconnects (stdio) or a shutdown is requested.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(transport = %self.transport, "Starting MCP server");

        match self.transport {
            Transport::Stdio => self.run_stdio().await,
            Transport::Http { host, port } => self.run_http(SocketAddr::new(host, port)).await,
        }
    }

    async fn run_stdio(self) -> Result<(), ServerError> {
        use rmcp::transport::io::stdio;

        let shutdown_rx = self.shutdown_rx;
        let handler = (self.factory)();

        let service = handler
            .serve(stdio())
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;

        tokio::select! {
            result = service.waiting() => {
                result.map_err(|e| ServerError::Transport(e.to_string()))?;
                tracing::info!("stdio peer disconnected");
                Ok(())
            }
            _ = shutdown_requested(shutdown_rx) => {
                tracing::info!("Received shutdown signal, stopping server");
                Ok(())
            }
        }
    }

    async fn run_http(self, addr: SocketAddr) -> Result<(), ServerError> {
        use rmcp::transport::streamable_http_server::{
            StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
        };

        let sessions_token = CancellationToken::new();
        let factory = self.factory.clone();
        let service = StreamableHttpService::new(
            move || Ok(factory()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                cancellation_token: sessions_token.child_token(),
                ..Default::default()
            },
        );

        let router = self.routes.nest_service(MCP_PATH, service);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed {
                addr,
                message: e.to_string(),
            })?;

        tracing::info!(%addr, path = MCP_PATH, "HTTP server listening");

        let shutdown_rx = self.shutdown_rx;
        let shutdown = {
            let sessions_token = sessions_token.clone();
            async move {
                shutdown_requested(shutdown_rx).await;
                tracing::info!("Received shutdown signal, closing sessions");
                sessions_token.cancel();
            }
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Transport(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_requested(rx: Option<oneshot::Receiver<()>>) {
    match rx {
        Some(rx) => {
            let _ = rx.await;
        }
        None => wait_for_shutdown_signal().await,
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to register unix signal handlers, falling back to Ctrl+C");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C, shutdown only via channel");
            std::future::pending::<()>().await;
        }
    }
}

/// Convenience function to set up graceful shutdown handling.
///
/// Returns a sender that can be used to trigger shutdown programmatically,
/// and a receiver to pass to the server builder.
pub fn shutdown_channel() -> (oneshot::Sender<()>, oneshot::Receiver<()>) {
    oneshot::channel()
}
