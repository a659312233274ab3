//! Model Context Protocol (MCP) implementation.
//!
//! # Architecture
//!
//! - `protocol` - JSON-RPC envelopes, the `Method` enum and MCP wire types
//! - `registry` - Tool registry shared by every server flavour
//! - `dispatcher` - Envelope validation, lifecycle and routing
//! - `server` - Core tools-only server
//! - `capability` - Extended server (built-ins, resources, prompts, logging)
//! - `legacy` - Registry-first adapter with optional delegation
//! - `transport` - Line-delimited stdio transport

pub mod builtin;
pub mod capability;
pub mod catalog;
pub mod dispatcher;
pub mod legacy;
pub mod prompts;
pub mod protocol;
pub mod registry;
pub mod resources;
pub mod server;
pub mod transport;

pub use capability::CapabilityServer;
pub use dispatcher::{Dispatcher, MethodHandler};
pub use legacy::LegacyAdapter;
pub use protocol::*;
pub use registry::{ToolDescriptor, ToolProvider, ToolRegistry};
pub use server::ToolServer;
pub use transport::{run_stdio, StdioTransport};
