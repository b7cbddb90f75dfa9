//! Shared plumbing for the MCP image generation server.
//!
//! Configuration loading, the low-level error hierarchy, tracing setup,
//! transport selection and the MCP server builder.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod server;
pub mod tracing;
pub mod transport;

#[cfg(test)]
mod config_test;

pub use config::{Config, ConfigArgs};
pub use error::{ConfigError, Error, Result};
pub use server::{McpServerBuilder, ServerError, shutdown_channel, wait_for_shutdown_signal};
pub use transport::{Transport, TransportArgs, TransportMode};
