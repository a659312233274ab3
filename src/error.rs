//! Error types for the MCP tool server.

use thiserror::Error;

use crate::mcp::protocol::error_codes;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the MCP tool server.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Protocol Errors =====
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// An error envelope received from a delegated handler, kept with its code.
    #[error("{message}")]
    Rpc { code: i32, message: String },

    #[error("Method '{0}' requires extended capabilities")]
    Unavailable(String),

    #[error("Server is closed")]
    Closed,

    // ===== Registry Errors =====
    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    // ===== Capability Errors =====
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid URI template: {0}")]
    Regex(#[from] regex::Error),

    // ===== HTTP Errors =====
    #[error("HTTP server error: {0}")]
    HttpServer(String),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// JSON-RPC error code used when this error escapes a method handler.
    ///
    /// Only an unsupported method and errors forwarded from a delegated
    /// handler carry their own code; everything else is an internal error.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::Rpc { code, .. } => *code,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Whether this is the tool-level "not found" signal.
    pub fn is_tool_not_found(&self) -> bool {
        matches!(self, Self::ToolNotFound(_))
    }
}
