//! YAML catalog of static resources and prompts loaded at startup.
//!
//! ```yaml
//! resources:
//!   - uri: docs://handbook
//!     name: handbook
//!     mime_type: text/markdown
//!     path: handbook.md        # or `text: ...`
//! prompts:
//!   - name: summarize
//!     description: Summarize a document
//!     arguments:
//!       - { name: topic, required: true }
//!     template: "Summarize {{topic}}."
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Error, Result};
use crate::mcp::prompts::{PromptArgument, PromptDescriptor, PromptRegistry};
use crate::mcp::resources::{
    guess_mime_type, FileText, ResourceDescriptor, ResourceRegistry, StaticText,
};

/// A resource entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResource {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// A prompt entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPrompt {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
    pub template: String,
}

/// Parsed catalog file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub resources: Vec<CatalogResource>,
    #[serde(default)]
    pub prompts: Vec<CatalogPrompt>,
    /// Directory relative `path` entries are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Catalog {
    /// Load and validate a catalog file.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Catalog(format!("Cannot read catalog {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let catalog = Self::parse(&text, base_dir).await?;
        info!(
            "Loaded catalog {} ({} resources, {} prompts)",
            path.display(),
            catalog.resources.len(),
            catalog.prompts.len()
        );
        Ok(catalog)
    }

    /// Parse catalog text; relative resource paths resolve against `base_dir`.
    pub async fn parse(text: &str, base_dir: PathBuf) -> Result<Self> {
        let mut catalog: Catalog = serde_yaml::from_str(text)?;
        catalog.base_dir = base_dir;
        catalog.validate().await?;
        Ok(catalog)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    async fn validate(&self) -> Result<()> {
        for resource in &self.resources {
            match (&resource.text, &resource.path) {
                (Some(_), None) => {}
                (None, Some(path)) => {
                    let full = self.resolve(path);
                    let is_file = tokio::fs::metadata(&full)
                        .await
                        .map(|m| m.is_file())
                        .unwrap_or(false);
                    if !is_file {
                        return Err(Error::Catalog(format!(
                            "Resource {} points at missing file {}",
                            resource.uri,
                            full.display()
                        )));
                    }
                }
                _ => {
                    return Err(Error::Catalog(format!(
                        "Resource {} needs exactly one of `text` or `path`",
                        resource.uri
                    )))
                }
            }
        }
        for prompt in &self.prompts {
            if prompt.name.trim().is_empty() {
                return Err(Error::Catalog("Prompt with empty name".to_string()));
            }
        }
        Ok(())
    }

    /// Register every entry.
    pub async fn install(&self, resources: &ResourceRegistry, prompts: &PromptRegistry) {
        for entry in &self.resources {
            let mut descriptor = match (&entry.text, &entry.path) {
                (Some(text), _) => {
                    ResourceDescriptor::new(&entry.uri, &entry.name, StaticText(text.clone()))
                }
                (None, Some(path)) => {
                    let full = self.resolve(path);
                    let mime = guess_mime_type(&full);
                    let descriptor =
                        ResourceDescriptor::new(&entry.uri, &entry.name, FileText(full));
                    match mime {
                        Some(mime) => descriptor.with_mime_type(mime),
                        None => descriptor,
                    }
                }
                // Rejected by validate().
                (None, None) => continue,
            };
            if let Some(mime) = &entry.mime_type {
                descriptor = descriptor.with_mime_type(mime);
            }
            if let Some(description) = &entry.description {
                descriptor = descriptor.with_description(description);
            }
            resources.add(descriptor).await;
        }

        for entry in &self.prompts {
            let mut descriptor =
                PromptDescriptor::new(&entry.name, &entry.description, &entry.template);
            descriptor.prompt.arguments = entry.arguments.clone();
            prompts.register(descriptor).await;
        }
    }
}
