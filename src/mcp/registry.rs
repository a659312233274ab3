//! Tool descriptors and the owner-namespaced tool registry.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::mcp::protocol::{Tool, ToolResult};

/// Arguments passed to a tool.
pub type ToolArguments = HashMap<String, Value>;

/// An invocable tool implementation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool. The returned value becomes the text content of the result.
    async fn call(&self, arguments: ToolArguments) -> Result<Value>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(ToolArguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn call(&self, arguments: ToolArguments) -> Result<Value> {
        (self)(arguments).await
    }
}

/// Input schema used when a tool does not declare one: a single free-form `query`.
pub fn default_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Free-form query"
            }
        }
    })
}

/// A named tool with its description, input contract and handler.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: Value,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    /// Create a descriptor with an empty description and the default schema.
    pub fn new(name: impl Into<String>, handler: impl ToolHandler + 'static) -> Self {
        Self::from_arc(name, Arc::new(handler))
    }

    /// Create a descriptor around an already shared handler.
    pub fn from_arc(name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: default_input_schema(),
            handler,
        }
    }

    /// Set the description from documentation text; only the first non-blank line is kept.
    pub fn with_description(mut self, docs: impl AsRef<str>) -> Self {
        self.description = docs
            .as_ref()
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();
        self
    }

    /// Replace the input schema.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    pub(crate) fn handler(&self) -> Arc<dyn ToolHandler> {
        self.handler.clone()
    }

    /// Wire form under the given exposed name.
    pub fn to_tool(&self, exposed_name: &str) -> Tool {
        Tool {
            name: exposed_name.to_string(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A component that owns a set of tools under one namespace.
pub trait ToolProvider: Send + Sync {
    /// Namespace prefix (`<namespace>.<tool>`).
    fn namespace(&self) -> &str;

    /// The tools this component exposes.
    fn tools(&self) -> Vec<ToolDescriptor>;
}

/// Caller-supplied capability check consulted before every tool invocation.
pub trait AccessPolicy: Send + Sync {
    /// Return `Err(Error::AccessDenied(..))` to refuse the call.
    fn check(&self, tool: &str, arguments: &ToolArguments) -> Result<()>;
}

/// Run a handler and turn its outcome into a tool result.
///
/// Handler failures become `isError` results; they never propagate.
pub(crate) async fn execute_handler(
    name: &str,
    handler: Arc<dyn ToolHandler>,
    arguments: ToolArguments,
) -> ToolResult {
    match handler.call(arguments).await {
        Ok(value) => ToolResult::text(render_value(value)),
        Err(e) => {
            warn!("Tool {} failed: {}", name, e);
            ToolResult::error(e.to_string())
        }
    }
}

/// Render a handler return value as text content.
pub fn render_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

fn validate_segment(kind: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::InvalidRegistration(format!("{} name is empty", kind)));
    }
    if segment.contains('.') || segment.chars().any(char::is_whitespace) {
        return Err(Error::InvalidRegistration(format!(
            "{} name '{}' must not contain dots or whitespace",
            kind, segment
        )));
    }
    Ok(())
}

struct RegistryEntry {
    owner: String,
    qualified_name: String,
    descriptor: ToolDescriptor,
}

#[derive(Default)]
struct RegistryInner {
    entries: Vec<RegistryEntry>,
    index: HashMap<String, usize>,
}

/// Registry of externally owned tools, keyed by `owner.tool`.
///
/// Registration happens at startup; afterwards the registry is read
/// concurrently by every transport connection.
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
    policy: Option<Arc<dyn AccessPolicy>>,
}

impl ToolRegistry {
    /// Create an empty registry with no access policy.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            policy: None,
        }
    }

    /// Create an empty registry guarded by an access policy.
    pub fn with_policy(policy: Arc<dyn AccessPolicy>) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            policy: Some(policy),
        }
    }

    /// Register descriptors under `owner`. Returns how many were registered.
    ///
    /// The whole batch is rejected if the owner or any local name is malformed.
    /// Re-registering a name the owner already has replaces it in place.
    pub async fn register(&self, owner: &str, descriptors: Vec<ToolDescriptor>) -> Result<usize> {
        validate_segment("Owner", owner)?;
        for descriptor in &descriptors {
            validate_segment("Tool", descriptor.name())?;
        }

        let count = descriptors.len();
        let mut inner = self.inner.write().await;
        for descriptor in descriptors {
            let qualified_name = format!("{}.{}", owner, descriptor.name());
            let entry = RegistryEntry {
                owner: owner.to_string(),
                qualified_name: qualified_name.clone(),
                descriptor,
            };
            match inner.index.get(&qualified_name).copied() {
                Some(pos) => {
                    debug!("Replacing tool {}", qualified_name);
                    inner.entries[pos] = entry;
                }
                None => {
                    let pos = inner.entries.len();
                    inner.entries.push(entry);
                    inner.index.insert(qualified_name, pos);
                }
            }
        }

        info!("Registered {} tools for owner '{}'", count, owner);
        Ok(count)
    }

    /// Register every tool a provider exposes under its namespace.
    pub async fn register_provider(&self, provider: &dyn ToolProvider) -> Result<usize> {
        self.register(provider.namespace(), provider.tools()).await
    }

    /// Tools in wire form, in insertion order, optionally restricted to one owner.
    pub async fn list(&self, owner: Option<&str>) -> Vec<Tool> {
        let inner = self.inner.read().await;
        inner
            .entries
            .iter()
            .filter(|entry| owner.map_or(true, |o| entry.owner == o))
            .map(|entry| entry.descriptor.to_tool(&entry.qualified_name))
            .collect()
    }

    /// Wire form of one tool.
    pub async fn get(&self, name: &str) -> Option<Tool> {
        let inner = self.inner.read().await;
        inner
            .index
            .get(name)
            .map(|&pos| inner.entries[pos].descriptor.to_tool(name))
    }

    /// Invoke a tool by fully-qualified name.
    ///
    /// Returns `Err(Error::ToolNotFound)` when no such tool exists. Handler
    /// failures and policy denials come back as `isError` results.
    pub async fn invoke(&self, name: &str, arguments: ToolArguments) -> Result<ToolResult> {
        let handler = {
            let inner = self.inner.read().await;
            let pos = inner
                .index
                .get(name)
                .copied()
                .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
            inner.entries[pos].descriptor.handler()
        };

        if let Some(policy) = &self.policy {
            if let Err(e) = policy.check(name, &arguments) {
                warn!("Tool {} refused: {}", name, e);
                return Ok(ToolResult::error(e.to_string()));
            }
        }

        debug!("Invoking tool {}", name);
        Ok(execute_handler(name, handler, arguments).await)
    }

    /// Whether a fully-qualified name is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.inner.read().await.index.contains_key(name)
    }

    /// Number of registered tools.
    pub async fn count(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Owners in first-registration order.
    pub async fn owners(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut owners: Vec<String> = Vec::new();
        for entry in &inner.entries {
            if !owners.contains(&entry.owner) {
                owners.push(entry.owner.clone());
            }
        }
        owners
    }

    /// Drop every registration, ahead of a full re-registration.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.index.clear();
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper to extract a required string argument.
pub fn get_string_arg(args: &ToolArguments, name: &str) -> Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| Error::InvalidParams(format!("Missing required argument: {}", name)))
}

/// Helper to extract an optional string argument.
pub fn get_optional_string_arg(args: &ToolArguments, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(String::from)
}
