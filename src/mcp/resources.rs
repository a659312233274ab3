//! MCP Resources Support
//!
//! Read-only data exposed under static URIs or `{var}` URI templates.

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

/// Page size for `resources/list`.
pub const PAGE_SIZE: usize = 100;

/// A resource exposed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A templated resource as listed by `resources/templates/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Resource contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
}

/// Result of resources/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    pub resources: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Result of resources/templates/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    pub resource_templates: Vec<ResourceTemplate>,
}

/// Result of resources/read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

/// What a fetch handler receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    /// The URI as the client sent it.
    pub uri: String,
    /// Decoded template variables; empty for static resources.
    pub params: HashMap<String, String>,
}

/// Produces the text of a resource.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self, request: ResourceRequest) -> Result<String>;
}

#[async_trait]
impl<F, Fut> ResourceHandler for F
where
    F: Fn(ResourceRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send,
{
    async fn read(&self, request: ResourceRequest) -> Result<String> {
        (self)(request).await
    }
}

/// Serves fixed text.
pub struct StaticText(pub String);

#[async_trait]
impl ResourceHandler for StaticText {
    async fn read(&self, _request: ResourceRequest) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Serves the current contents of a file.
pub struct FileText(pub PathBuf);

#[async_trait]
impl ResourceHandler for FileText {
    async fn read(&self, _request: ResourceRequest) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.0).await?)
    }
}

/// A static resource and its fetch handler.
#[derive(Clone)]
pub struct ResourceDescriptor {
    pub resource: Resource,
    handler: Arc<dyn ResourceHandler>,
}

impl ResourceDescriptor {
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        handler: impl ResourceHandler + 'static,
    ) -> Self {
        Self {
            resource: Resource {
                uri: uri.into(),
                name: name.into(),
                description: None,
                mime_type: Some("text/plain".to_string()),
            },
            handler: Arc::new(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.resource.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.resource.mime_type = Some(mime_type.into());
        self
    }
}

/// A templated resource and its fetch handler.
#[derive(Clone)]
pub struct ResourceTemplateDescriptor {
    pub template: ResourceTemplate,
    handler: Arc<dyn ResourceHandler>,
}

impl ResourceTemplateDescriptor {
    pub fn new(
        uri_template: impl Into<String>,
        name: impl Into<String>,
        handler: impl ResourceHandler + 'static,
    ) -> Self {
        Self {
            template: ResourceTemplate {
                uri_template: uri_template.into(),
                name: name.into(),
                description: None,
                mime_type: Some("text/plain".to_string()),
            },
            handler: Arc::new(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.template.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.template.mime_type = Some(mime_type.into());
        self
    }
}

struct CompiledTemplate {
    descriptor: ResourceTemplateDescriptor,
    pattern: Regex,
    variables: Vec<String>,
}

impl CompiledTemplate {
    fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.pattern.captures(uri)?;
        let params = self
            .variables
            .iter()
            .filter_map(|var| {
                captures.name(var).map(|m| {
                    let decoded = percent_decode_str(m.as_str()).decode_utf8_lossy();
                    (var.clone(), decoded.into_owned())
                })
            })
            .collect();
        Some(params)
    }
}

/// Compile a `{var}` URI template into an anchored regex.
///
/// Each variable matches one non-empty path segment.
fn compile_template(template: &str) -> Result<(Regex, Vec<String>)> {
    let var = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}")?;
    let mut pattern = String::from("^");
    let mut variables = Vec::new();
    let mut last = 0;

    for caps in var.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        pattern.push_str(&regex::escape(&template[last..whole.start()]));
        pattern.push_str(&format!("(?P<{}>[^/]+)", name.as_str()));
        variables.push(name.as_str().to_string());
        last = whole.end();
    }
    let rest = &template[last..];
    if rest.contains('{') || rest.contains('}') {
        return Err(Error::Catalog(format!(
            "Malformed URI template: {}",
            template
        )));
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');

    Ok((Regex::new(&pattern)?, variables))
}

/// Resource registry and manager.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: RwLock<Vec<ResourceDescriptor>>,
    templates: RwLock<Vec<CompiledTemplate>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a static resource. A resource with the same URI is replaced.
    pub async fn add(&self, descriptor: ResourceDescriptor) {
        let mut resources = self.resources.write().await;
        match resources
            .iter_mut()
            .find(|r| r.resource.uri == descriptor.resource.uri)
        {
            Some(existing) => *existing = descriptor,
            None => resources.push(descriptor),
        }
    }

    /// Add a templated resource.
    pub async fn add_template(&self, descriptor: ResourceTemplateDescriptor) -> Result<()> {
        let (pattern, variables) = compile_template(&descriptor.template.uri_template)?;
        let mut templates = self.templates.write().await;
        templates.retain(|t| t.descriptor.template.uri_template != descriptor.template.uri_template);
        templates.push(CompiledTemplate {
            descriptor,
            pattern,
            variables,
        });
        Ok(())
    }

    /// List static resources, `PAGE_SIZE` at a time. The cursor is an opaque offset.
    pub async fn list(&self, cursor: Option<&str>) -> Result<ListResourcesResult> {
        let start = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| Error::InvalidParams(format!("Invalid cursor: {}", c)))?,
            None => 0,
        };

        let all = self.resources.read().await;
        let resources: Vec<Resource> = all
            .iter()
            .skip(start)
            .take(PAGE_SIZE)
            .map(|d| d.resource.clone())
            .collect();

        let end = start + resources.len();
        let next_cursor = (end < all.len()).then(|| end.to_string());

        Ok(ListResourcesResult {
            resources,
            next_cursor,
        })
    }

    /// List resource templates.
    pub async fn list_templates(&self) -> ListResourceTemplatesResult {
        let templates = self.templates.read().await;
        ListResourceTemplatesResult {
            resource_templates: templates
                .iter()
                .map(|t| t.descriptor.template.clone())
                .collect(),
        }
    }

    /// Read a resource. Static URIs win over templates; templates are tried in order.
    pub async fn read(&self, uri: &str) -> Result<ReadResourceResult> {
        let (handler, mime_type, params) = self
            .resolve(uri)
            .await
            .ok_or_else(|| Error::ResourceNotFound(uri.to_string()))?;

        debug!("Reading resource {}", uri);
        let text = handler
            .read(ResourceRequest {
                uri: uri.to_string(),
                params,
            })
            .await?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: uri.to_string(),
                mime_type,
                text,
            }],
        })
    }

    async fn resolve(
        &self,
        uri: &str,
    ) -> Option<(Arc<dyn ResourceHandler>, Option<String>, HashMap<String, String>)> {
        {
            let resources = self.resources.read().await;
            if let Some(d) = resources.iter().find(|d| d.resource.uri == uri) {
                return Some((d.handler.clone(), d.resource.mime_type.clone(), HashMap::new()));
            }
        }

        let templates = self.templates.read().await;
        templates.iter().find_map(|t| {
            t.matches(uri).map(|params| {
                (
                    t.descriptor.handler.clone(),
                    t.descriptor.template.mime_type.clone(),
                    params,
                )
            })
        })
    }

    /// Number of static resources.
    pub async fn count(&self) -> usize {
        self.resources.read().await.len()
    }
}

/// Infer a MIME type string for a file path based on its extension.
pub fn guess_mime_type(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    let mime = match ext {
        "json" => "application/json",
        "yaml" | "yml" => "text/yaml",
        "toml" => "text/x-toml",
        "md" => "text/markdown",
        "html" => "text/html",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "txt" => "text/plain",
        _ => "text/plain",
    };
    Some(mime.to_string())
}
