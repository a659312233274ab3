//! MCP Tool Server
//!
//! A Model Context Protocol (MCP) server speaking JSON-RPC 2.0. Components
//! register namespaced tools into a shared registry; clients discover and call
//! them over stdio, Server-Sent Events or plain HTTP POST.
//!
//! # Architecture
//!
//! 1. **Registry** (`mcp::registry`) - Namespaced tool registration and invocation
//! 2. **Protocol Core** (`mcp::dispatcher`, `mcp::server`) - Envelope validation,
//!    session lifecycle and the four core methods
//! 3. **Capability Server** (`mcp::capability`) - Built-in tools, resources,
//!    prompts and runtime log level control
//! 4. **Legacy Adapter** (`mcp::legacy`) - Registry-first front end that degrades
//!    to tools-only when extended capabilities are unavailable
//! 5. **Transports** (`mcp::transport`, `http`) - stdio, SSE and streamable HTTP

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod metrics;
pub mod tools;

pub use error::{Error, Result};

/// Crate version, used as the default server version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
