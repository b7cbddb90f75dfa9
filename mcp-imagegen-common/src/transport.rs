//! MCP transport selection.
//!
//! The image server speaks MCP over one of two transports:
//!
//! - **Stdio**: newline-delimited JSON-RPC over stdin/stdout, one session
//! - **Streamable HTTP**: JSON-RPC over HTTP with server-sent events for
//!   notifications, many concurrent sessions
//!
//! # Example
//!
//! ```
//! use clap::Parser;
//! use mcp_imagegen_common::transport::{Transport, TransportArgs};
//!
//! #[derive(Parser)]
//! struct Args {
//!     #[command(flatten)]
//!     transport: TransportArgs,
//! }
//!
//! let args = Args::parse_from(["server", "--transport", "stdio"]);
//! assert!(args.transport.into_transport().is_stdio());
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::{Args, ValueEnum};

/// Default port for the streamable HTTP transport.
pub const DEFAULT_PORT: u16 = 3000;

/// Default bind address for the streamable HTTP transport.
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Transport for MCP server communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Standard input/output transport.
    Stdio,
    /// Streamable HTTP transport, served under `/mcp`.
    Http {
        /// Address to bind to
        host: IpAddr,
        /// Port to listen on
        port: u16,
    },
}

impl Default for Transport {
    fn default() -> Self {
        Transport::Http {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
        }
    }
}

impl Transport {
    /// Create a new stdio transport.
    pub fn stdio() -> Self {
        Transport::Stdio
    }

    /// Create a new HTTP transport bound to `host:port`.
    pub fn http(host: IpAddr, port: u16) -> Self {
        Transport::Http { host, port }
    }

    /// Check if this is a stdio transport.
    pub fn is_stdio(&self) -> bool {
        matches!(self, Transport::Stdio)
    }

    /// Check if this is an HTTP transport.
    pub fn is_http(&self) -> bool {
        matches!(self, Transport::Http { .. })
    }

    /// Socket address for network transports.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Transport::Stdio => None,
            Transport::Http { host, port } => Some(SocketAddr::new(*host, *port)),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stdio => write!(f, "stdio"),
            Transport::Http { host, port } => write!(f, "streamable-http ({}:{})", host, port),
        }
    }
}

/// Transport mode parsed from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    Stdio,
    #[default]
    #[value(name = "streamable-http", alias = "http")]
    StreamableHttp,
}

/// Command-line arguments for transport configuration.
#[derive(Args, Debug, Clone)]
pub struct TransportArgs {
    /// Transport mode
    #[arg(long, env = "TRANSPORT", value_enum, default_value_t = TransportMode::StreamableHttp, ignore_case = true)]
    pub transport: TransportMode,

    /// Address to bind for the HTTP transport
    #[arg(long, env = "HOST", default_value_t = DEFAULT_HOST)]
    pub host: IpAddr,

    /// Port for the HTTP transport
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl TransportArgs {
    /// Convert command-line arguments into a Transport configuration.
    pub fn into_transport(self) -> Transport {
        match self.transport {
            TransportMode::Stdio => Transport::Stdio,
            TransportMode::StreamableHttp => Transport::Http {
                host: self.host,
                port: self.port,
            },
        }
    }
}

impl Default for TransportArgs {
    fn default() -> Self {
        Self {
            transport: TransportMode::default(),
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
        }
    }
}
