//! Compatibility front end that keeps working without extended capabilities.
//!
//! The adapter always answers the core methods from the registry. Everything
//! else is forwarded to a [`CapabilityServer`] when one could be built, and
//! reported as [`Error::Unavailable`] when not.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::mcp::builtin::merge_tools;
use crate::mcp::capability::CapabilityServer;
use crate::mcp::dispatcher::{route, MethodHandler};
use crate::mcp::protocol::*;
use crate::mcp::registry::ToolRegistry;
use crate::mcp::server::{call_registry_tool, initialize_result};

/// Registry-first handler with optional delegation.
pub struct LegacyAdapter {
    registry: Arc<ToolRegistry>,
    capability: Option<Arc<CapabilityServer>>,
    info: ServerInfo,
}

impl LegacyAdapter {
    pub fn new(
        registry: Arc<ToolRegistry>,
        capability: Option<Arc<CapabilityServer>>,
        info: ServerInfo,
    ) -> Self {
        Self {
            registry,
            capability,
            info,
        }
    }

    /// Build the adapter, tolerating a capability server that fails to build.
    pub async fn connect<F>(registry: Arc<ToolRegistry>, info: ServerInfo, build: F) -> Self
    where
        F: Future<Output = Result<CapabilityServer>>,
    {
        let capability = match build.await {
            Ok(server) => {
                info!("Legacy adapter using extended capabilities");
                Some(Arc::new(server))
            }
            Err(e) => {
                warn!(
                    "Extended capabilities unavailable, running registry-only: {}",
                    e
                );
                None
            }
        };
        Self::new(registry, capability, info)
    }

    /// Whether delegation is possible.
    pub fn is_degraded(&self) -> bool {
        self.capability.is_none()
    }

    async fn list_tools(&self) -> Vec<Tool> {
        let registered = self.registry.list(None).await;
        match &self.capability {
            Some(capability) => merge_tools(capability.builtins().list(), registered),
            None => registered,
        }
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<Value> {
        if let Some(capability) = &self.capability {
            let builtins = capability.builtins();
            if builtins.contains(&params.name) {
                let result = builtins.invoke(&params.name, params.arguments).await?;
                return Ok(serde_json::to_value(result)?);
            }
        }
        call_registry_tool(&self.registry, params).await
    }

    /// Forward a method to the capability server through a fresh envelope.
    async fn delegate(&self, method: Method, params: Option<Value>) -> Result<Value> {
        let Some(capability) = &self.capability else {
            return Err(Error::Unavailable(method.to_string()));
        };
        debug!("Delegating {} to capability server", method);
        let request = JsonRpcRequest::new(RequestId::Null, method.as_str(), params);
        route(capability.as_ref(), request).await.into_result()
    }
}

#[async_trait]
impl MethodHandler for LegacyAdapter {
    async fn call(&self, method: Method, params: Option<Value>) -> Result<Value> {
        match method {
            Method::Initialize => {
                let capabilities = match &self.capability {
                    Some(capability) => capability.capabilities(),
                    None => ServerCapabilities::tools_only(),
                };
                initialize_result(&self.info, capabilities)
            }
            Method::Ping => Ok(json!({})),
            Method::ToolsList => Ok(serde_json::to_value(ListToolsResult {
                tools: self.list_tools().await,
            })?),
            Method::ToolsCall => self.call_tool(CallToolParams::from_params(params)?).await,
            Method::ResourcesList
            | Method::ResourcesRead
            | Method::ResourcesTemplatesList
            | Method::PromptsList
            | Method::PromptsGet
            | Method::LoggingSetLevel
            | Method::NotificationsInitialized => self.delegate(method, params).await,
        }
    }
}
