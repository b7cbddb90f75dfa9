//! Tracing initialization.
//!
//! Logs always go to **stderr**: with the stdio transport, stdout carries the
//! JSON-RPC stream and must stay clean.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: overrides the level given on the command line. Examples:
//!   - `RUST_LOG=debug` - Enable debug logging for all modules
//!   - `RUST_LOG=warn,mcp_imagegen=debug` - Warn by default, debug for the server
//!
//! # Usage
//!
//! ```no_run
//! use mcp_imagegen_common::tracing::init_tracing_with_default;
//!
//! init_tracing_with_default("INFO");
//! tracing::info!("Server starting");
//! ```

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
    util::TryInitError,
};

/// Map a user-facing log level name to a `tracing` filter directive.
///
/// Accepts the usual names in any case, plus `WARNING` and `CRITICAL`.
/// Unknown names fall back to `info`.
pub fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        "off" => "off",
        _ => "info",
    }
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(normalize_level(default_level)))
}

fn try_init(default_level: &str) -> Result<(), TryInitError> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(build_filter(default_level))
        .with(fmt_layer)
        .try_init()
}

/// Initialize tracing with `default_level` unless `RUST_LOG` is set.
///
/// A second call is a no-op and reports the conflict at debug level.
pub fn init_tracing_with_default(default_level: &str) {
    if let Err(e) = try_init(default_level) {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}

/// Try to initialize tracing at `info`, returning an error if already initialized.
pub fn try_init_tracing() -> Result<(), TryInitError> {
    try_init("info")
}
