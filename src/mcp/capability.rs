//! Extended server: tools plus resources, prompts and runtime log control.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::logging::{LevelControl, LogLevel};
use crate::mcp::builtin::{merge_tools, server_tools, BuiltinTools};
use crate::mcp::catalog::Catalog;
use crate::mcp::dispatcher::MethodHandler;
use crate::mcp::prompts::{ListPromptsResult, PromptDescriptor, PromptRegistry};
use crate::mcp::protocol::*;
use crate::mcp::registry::{render_value, ToolDescriptor, ToolRegistry};
use crate::mcp::resources::{
    ResourceDescriptor, ResourceHandler, ResourceRegistry, ResourceRequest,
    ResourceTemplateDescriptor, StaticText,
};
use crate::mcp::server::{call_registry_tool, initialize_result};
use crate::metrics::Metrics;

const USE_TOOL_TEMPLATE: &str = "Use the tool `{{tool}}`{{#if goal}} to {{goal}}{{/if}}.\n\
Call it with `tools/call`, passing arguments that match its input schema. \
Read `tools://{{tool}}` to see the schema first.";

/// Turn params into a named-parameter map. Absent params are an empty map.
fn named_params(method: Method, params: Option<Value>) -> Result<Map<String, Value>> {
    match params {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(Error::InvalidParams(format!(
            "{} expects named params",
            method
        ))),
    }
}

fn required_str(params: &Map<String, Value>, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidParams(format!("Missing required parameter: {}", key)))
}

/// Serves `server://tools`: the merged tool listing.
struct ToolListResource {
    registry: Arc<ToolRegistry>,
    builtins: Arc<BuiltinTools>,
}

#[async_trait]
impl ResourceHandler for ToolListResource {
    async fn read(&self, _request: ResourceRequest) -> Result<String> {
        let tools = merge_tools(self.builtins.list(), self.registry.list(None).await);
        Ok(serde_json::to_string_pretty(&tools)?)
    }
}

/// Serves `tools://{name}`: one tool descriptor.
struct ToolDescriptorResource {
    registry: Arc<ToolRegistry>,
    builtins: Arc<BuiltinTools>,
}

#[async_trait]
impl ResourceHandler for ToolDescriptorResource {
    async fn read(&self, request: ResourceRequest) -> Result<String> {
        let name = request.params.get("name").cloned().unwrap_or_default();
        let builtin = self.builtins.list().into_iter().find(|t| t.name == name);
        let tool = match builtin {
            Some(tool) => tool,
            None => self
                .registry
                .get(&name)
                .await
                .ok_or_else(|| Error::ResourceNotFound(request.uri.clone()))?,
        };
        Ok(serde_json::to_string_pretty(&tool)?)
    }
}

/// Builder for [`CapabilityServer`].
pub struct CapabilityServerBuilder {
    registry: Arc<ToolRegistry>,
    info: ServerInfo,
    metrics: Arc<Metrics>,
    catalog: Option<PathBuf>,
    log_control: Option<Arc<dyn LevelControl>>,
    extra_builtins: Vec<ToolDescriptor>,
}

impl CapabilityServerBuilder {
    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Load resources and prompts from a YAML catalog.
    pub fn catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog = Some(path.into());
        self
    }

    /// Apply `logging/setLevel` through this control.
    pub fn log_control(mut self, control: Arc<dyn LevelControl>) -> Self {
        self.log_control = Some(control);
        self
    }

    /// Add a built-in tool. Built-ins shadow registered tools of the same name.
    pub fn builtin(mut self, descriptor: ToolDescriptor) -> Self {
        self.extra_builtins.push(descriptor);
        self
    }

    /// Assemble the server. Fails when the catalog cannot be loaded.
    pub async fn build(self) -> Result<CapabilityServer> {
        let catalog = match self.catalog.as_deref() {
            Some(path) => Some(Catalog::load(path).await?),
            None => None,
        };

        let builtins = self.extra_builtins.into_iter().fold(
            server_tools(self.registry.clone(), self.metrics.clone(), self.info.clone()),
            BuiltinTools::with,
        );
        let builtins = Arc::new(builtins);

        let resources = ResourceRegistry::new();
        let info_text = serde_json::to_string_pretty(&json!({
            "name": self.info.name,
            "version": self.info.version,
            "protocolVersion": MCP_VERSION,
        }))?;
        resources
            .add(
                ResourceDescriptor::new(
                    "server://info",
                    "server-info",
                    StaticText(info_text),
                )
                .with_description("Server identity")
                .with_mime_type("application/json"),
            )
            .await;
        resources
            .add(
                ResourceDescriptor::new(
                    "server://tools",
                    "server-tools",
                    ToolListResource {
                        registry: self.registry.clone(),
                        builtins: builtins.clone(),
                    },
                )
                .with_description("Every tool the server currently exposes")
                .with_mime_type("application/json"),
            )
            .await;
        resources
            .add_template(
                ResourceTemplateDescriptor::new(
                    "tools://{name}",
                    "tool",
                    ToolDescriptorResource {
                        registry: self.registry.clone(),
                        builtins: builtins.clone(),
                    },
                )
                .with_description("Descriptor of a single tool")
                .with_mime_type("application/json"),
            )
            .await?;

        let prompts = PromptRegistry::new();
        prompts
            .register(
                PromptDescriptor::new(
                    "use_tool",
                    "Guidance for calling one of the server's tools",
                    USE_TOOL_TEMPLATE,
                )
                .argument("tool", "Name of the tool to call", true)
                .argument("goal", "What the call should achieve", false),
            )
            .await;

        if let Some(catalog) = &catalog {
            catalog.install(&resources, &prompts).await;
        }

        info!(
            "Capability server ready: {} built-in tools, {} resources, {} prompts",
            builtins.len(),
            resources.count().await,
            prompts.count().await
        );

        Ok(CapabilityServer {
            registry: self.registry,
            builtins,
            resources,
            prompts,
            info: self.info,
            log_control: self.log_control,
            level: RwLock::new(LogLevel::Info),
        })
    }
}

/// Tools, resources, prompts and logging behind one [`MethodHandler`].
pub struct CapabilityServer {
    registry: Arc<ToolRegistry>,
    builtins: Arc<BuiltinTools>,
    resources: ResourceRegistry,
    prompts: PromptRegistry,
    info: ServerInfo,
    log_control: Option<Arc<dyn LevelControl>>,
    level: RwLock<LogLevel>,
}

impl CapabilityServer {
    pub fn builder(registry: Arc<ToolRegistry>, info: ServerInfo) -> CapabilityServerBuilder {
        CapabilityServerBuilder {
            registry,
            info,
            metrics: Metrics::new(),
            catalog: None,
            log_control: None,
            extra_builtins: Vec::new(),
        }
    }

    /// Capabilities advertised on `initialize`.
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            resources: Some(ResourcesCapability::default()),
            prompts: Some(PromptsCapability::default()),
            logging: Some(LoggingCapability::default()),
        }
    }

    pub fn builtins(&self) -> &BuiltinTools {
        &self.builtins
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }

    /// Level most recently set through `logging/setLevel`.
    pub async fn log_level(&self) -> LogLevel {
        *self.level.read().await
    }

    /// Built-ins first, then registered tools.
    pub async fn list_tools(&self) -> Vec<Tool> {
        merge_tools(self.builtins.list(), self.registry.list(None).await)
    }

    async fn call_tool(&self, params: CallToolParams) -> Result<Value> {
        if self.builtins.contains(&params.name) {
            let result = self.builtins.invoke(&params.name, params.arguments).await?;
            return Ok(serde_json::to_value(result)?);
        }
        call_registry_tool(&self.registry, params).await
    }

    async fn set_level(&self, params: Option<Value>) -> Result<Value> {
        let params = named_params(Method::LoggingSetLevel, params)?;
        let level: LogLevel = required_str(&params, "level")?.parse()?;
        if let Some(control) = &self.log_control {
            control.set_level(level)?;
        }
        *self.level.write().await = level;
        info!("Log level set to {}", level.as_str());
        Ok(json!({}))
    }
}

#[async_trait]
impl MethodHandler for CapabilityServer {
    async fn call(&self, method: Method, params: Option<Value>) -> Result<Value> {
        match method {
            Method::Initialize => initialize_result(&self.info, self.capabilities()),
            Method::Ping => Ok(json!({})),
            Method::NotificationsInitialized => {
                info!("Client reported initialized");
                Ok(Value::Null)
            }
            Method::ToolsList => Ok(serde_json::to_value(ListToolsResult {
                tools: self.list_tools().await,
            })?),
            Method::ToolsCall => self.call_tool(CallToolParams::from_params(params)?).await,
            Method::ResourcesList => {
                let params = named_params(method, params)?;
                let cursor = params.get("cursor").and_then(Value::as_str);
                Ok(serde_json::to_value(self.resources.list(cursor).await?)?)
            }
            Method::ResourcesRead => {
                let uri = required_str(&named_params(method, params)?, "uri")?;
                Ok(serde_json::to_value(self.resources.read(&uri).await?)?)
            }
            Method::ResourcesTemplatesList => {
                Ok(serde_json::to_value(self.resources.list_templates().await)?)
            }
            Method::PromptsList => Ok(serde_json::to_value(ListPromptsResult {
                prompts: self.prompts.list().await,
                next_cursor: None,
            })?),
            Method::PromptsGet => {
                let mut params = named_params(method, params)?;
                let name = required_str(&params, "name")?;
                let arguments: HashMap<String, String> = match params.remove("arguments") {
                    Some(Value::Object(map)) => map
                        .into_iter()
                        .map(|(k, v)| (k, render_value(v)))
                        .collect(),
                    Some(Value::Null) | None => HashMap::new(),
                    Some(_) => {
                        return Err(Error::InvalidParams(
                            "Prompt arguments must be an object".to_string(),
                        ))
                    }
                };
                debug!("Rendering prompt {}", name);
                Ok(serde_json::to_value(self.prompts.get(&name, &arguments).await?)?)
            }
            Method::LoggingSetLevel => self.set_level(params).await,
        }
    }
}
