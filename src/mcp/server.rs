//! Registry-backed core server: `initialize`, `ping`, `tools/list`, `tools/call`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::mcp::dispatcher::MethodHandler;
use crate::mcp::protocol::*;
use crate::mcp::registry::ToolRegistry;

/// Build an `initialize` result.
pub fn initialize_result(info: &ServerInfo, capabilities: ServerCapabilities) -> Result<Value> {
    let result = InitializeResult {
        protocol_version: MCP_VERSION.to_string(),
        capabilities,
        server_info: info.clone(),
    };
    Ok(serde_json::to_value(result)?)
}

/// Call a registry tool, folding "not found" into a tool-level error result.
pub async fn call_registry_tool(registry: &ToolRegistry, params: CallToolParams) -> Result<Value> {
    let result = match registry.invoke(&params.name, params.arguments).await {
        Ok(result) => result,
        Err(e) if e.is_tool_not_found() => {
            debug!("{}", e);
            ToolResult::error(e.to_string())
        }
        Err(e) => return Err(e),
    };
    Ok(serde_json::to_value(result)?)
}

/// The protocol core: tools only, straight from the registry.
pub struct ToolServer {
    registry: Arc<ToolRegistry>,
    info: ServerInfo,
}

impl ToolServer {
    /// Create a core server over a registry.
    pub fn new(registry: Arc<ToolRegistry>, info: ServerInfo) -> Self {
        Self { registry, info }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }
}

#[async_trait]
impl MethodHandler for ToolServer {
    async fn call(&self, method: Method, params: Option<Value>) -> Result<Value> {
        match method {
            Method::Initialize => initialize_result(&self.info, ServerCapabilities::tools_only()),
            Method::Ping => Ok(json!({})),
            Method::ToolsList => {
                let tools = self.registry.list(None).await;
                Ok(serde_json::to_value(ListToolsResult { tools })?)
            }
            Method::ToolsCall => {
                let params = CallToolParams::from_params(params)?;
                call_registry_tool(&self.registry, params).await
            }
            Method::ResourcesList
            | Method::ResourcesRead
            | Method::ResourcesTemplatesList
            | Method::PromptsList
            | Method::PromptsGet
            | Method::LoggingSetLevel
            | Method::NotificationsInitialized => Err(Error::MethodNotFound(method.to_string())),
        }
    }
}
