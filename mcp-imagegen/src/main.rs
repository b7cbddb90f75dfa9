//! MCP image generation server.

use anyhow::{Context, Result};
use clap::Parser;
use mcp_imagegen::{Dispatcher, ImageGenServer, http};
use mcp_imagegen_common::config::load_dotenv;
use mcp_imagegen_common::tracing::init_tracing_with_default;
use mcp_imagegen_common::{ConfigArgs, McpServerBuilder, TransportArgs, shutdown_channel, wait_for_shutdown_signal};
use tokio_util::sync::CancellationToken;

/// Command-line arguments for the image generation server.
#[derive(Parser, Debug)]
#[command(name = "mcp-imagegen")]
#[command(about = "MCP server for image generation jobs using the Gemini Imagen API")]
struct Args {
    /// Transport configuration
    #[command(flatten)]
    transport: TransportArgs,

    /// Backend, storage and job settings
    #[command(flatten)]
    config: ConfigArgs,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so .env values feed the env-backed flags.
    load_dotenv();
    let args = Args::parse();

    init_tracing_with_default(&args.log_level);
    tracing::info!("mcp-imagegen server starting...");

    let config = args.config.into_config().context("Invalid configuration")?;
    tracing::info!(config = ?config, "Configuration loaded");

    let dispatcher = Dispatcher::from_config(&config);
    let server = ImageGenServer::new(dispatcher.clone(), config.model.clone());

    // Signals end open event streams first, then stop the transport.
    let closing = CancellationToken::new();
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn({
        let closing = closing.clone();
        async move {
            wait_for_shutdown_signal().await;
            closing.cancel();
            let _ = shutdown_tx.send(());
        }
    });

    let transport = args.transport.into_transport();
    let mut builder = McpServerBuilder::new(server)
        .with_session_factory(|server: &ImageGenServer| server.for_new_session())
        .with_transport(transport)
        .with_shutdown(shutdown_rx);
    if transport.is_http() {
        builder = builder.with_routes(http::router(dispatcher.clone(), closing));
    }

    let served = builder.run().await;

    dispatcher.shutdown(config.shutdown_grace).await;
    served?;

    tracing::info!("Server stopped");
    Ok(())
}
