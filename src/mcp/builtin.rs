//! Tools implemented by the server itself, and the merge rule that puts them
//! ahead of externally registered tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::mcp::protocol::{ServerInfo, Tool, ToolResult};
use crate::mcp::registry::{execute_handler, ToolArguments, ToolDescriptor, ToolHandler, ToolRegistry};
use crate::metrics::Metrics;

/// Merge built-in and registered tool lists.
///
/// Precedence is declared order: every built-in first, then registered tools.
/// When a name appears more than once the first occurrence wins, so a
/// registered tool that shadows a built-in is dropped from the listing.
pub fn merge_tools(builtins: Vec<Tool>, registered: Vec<Tool>) -> Vec<Tool> {
    let mut seen = HashSet::new();
    builtins
        .into_iter()
        .chain(registered)
        .filter(|tool| {
            let first = seen.insert(tool.name.clone());
            if !first {
                debug!("Dropping duplicate tool {}", tool.name);
            }
            first
        })
        .collect()
}

/// Fixed set of server-implemented tools. Names are used as-is.
#[derive(Default, Clone)]
pub struct BuiltinTools {
    tools: Vec<ToolDescriptor>,
}

impl BuiltinTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool; a tool with the same name is replaced.
    pub fn with(mut self, descriptor: ToolDescriptor) -> Self {
        match self.tools.iter_mut().find(|t| t.name() == descriptor.name()) {
            Some(existing) => *existing = descriptor,
            None => self.tools.push(descriptor),
        }
        self
    }

    pub fn list(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.to_tool(t.name())).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a built-in. `Err(Error::ToolNotFound)` when there is none by that name.
    pub async fn invoke(&self, name: &str, arguments: ToolArguments) -> Result<ToolResult> {
        let descriptor = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        Ok(execute_handler(name, descriptor.handler(), arguments).await)
    }
}

fn no_arguments() -> Value {
    json!({ "type": "object", "properties": {} })
}

struct HealthTool {
    registry: Arc<ToolRegistry>,
    metrics: Arc<Metrics>,
    info: ServerInfo,
}

#[async_trait]
impl ToolHandler for HealthTool {
    async fn call(&self, _arguments: ToolArguments) -> Result<Value> {
        Ok(json!({
            "status": "ok",
            "name": self.info.name,
            "version": self.info.version,
            "registeredTools": self.registry.count().await,
            "owners": self.registry.owners().await,
            "metrics": self.metrics.snapshot(),
        }))
    }
}

struct OwnersTool {
    registry: Arc<ToolRegistry>,
}

#[async_trait]
impl ToolHandler for OwnersTool {
    async fn call(&self, _arguments: ToolArguments) -> Result<Value> {
        Ok(json!(self.registry.owners().await))
    }
}

struct TimeTool;

#[async_trait]
impl ToolHandler for TimeTool {
    async fn call(&self, _arguments: ToolArguments) -> Result<Value> {
        Ok(Value::String(chrono::Utc::now().to_rfc3339()))
    }
}

/// The server's own introspection tools.
pub fn server_tools(
    registry: Arc<ToolRegistry>,
    metrics: Arc<Metrics>,
    info: ServerInfo,
) -> BuiltinTools {
    BuiltinTools::new()
        .with(
            ToolDescriptor::new(
                "server.health",
                HealthTool {
                    registry: registry.clone(),
                    metrics,
                    info,
                },
            )
            .with_description("Report server identity, registered tool count and request metrics.")
            .with_schema(no_arguments()),
        )
        .with(
            ToolDescriptor::new("server.owners", OwnersTool { registry })
                .with_description("List the owners that registered tools, in registration order.")
                .with_schema(no_arguments()),
        )
        .with(
            ToolDescriptor::new("server.time", TimeTool)
                .with_description("Current server time in RFC 3339 format.")
                .with_schema(no_arguments()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, description: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({}),
        }
    }

    #[test]
    fn test_merge_prefers_builtins() {
        let merged = merge_tools(
            vec![tool("x", "builtin"), tool("y", "builtin")],
            vec![tool("a.b", "registered"), tool("x", "registered")],
        );

        let names: Vec<_> = merged.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "a.b"]);
        assert_eq!(merged[0].description, "builtin");
    }

    #[test]
    fn test_merge_keeps_first_registered_duplicate() {
        let merged = merge_tools(
            vec![],
            vec![tool("a.b", "first"), tool("a.b", "second")],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].description, "first");
    }

    #[tokio::test]
    async fn test_server_tools() {
        let registry = Arc::new(ToolRegistry::new());
        let info = ServerInfo {
            name: "t".to_string(),
            version: "1".to_string(),
        };
        let tools = server_tools(registry, Metrics::new(), info);
        assert_eq!(tools.len(), 3);
        assert!(tools.contains("server.health"));

        let health = tools
            .invoke("server.health", ToolArguments::new())
            .await
            .unwrap();
        assert!(!health.is_error);
        let body: Value = serde_json::from_str(&health.text_content()).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["registeredTools"], 0);

        let time = tools.invoke("server.time", ToolArguments::new()).await.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&time.text_content()).is_ok());
    }

    #[tokio::test]
    async fn test_unknown_builtin() {
        let tools = BuiltinTools::new();
        assert!(tools.is_empty());
        let err = tools.invoke("server.nope", ToolArguments::new()).await.unwrap_err();
        assert!(err.is_tool_not_found());
    }
}
