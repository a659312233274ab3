//! MCP Prompt Templates
//!
//! Named, parameterized text templates materialized on `prompts/get`.
//! Templates use `{{arg}}` substitution and `{{#if arg}}...{{/if}}` sections.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// A prompt argument definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// A prompt as listed by `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// A prompt message (the actual content).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: PromptContent,
}

/// Prompt content types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PromptContent {
    Text { text: String },
}

/// Result of prompts/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPromptsResult {
    pub prompts: Vec<Prompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Result of prompts/get.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

/// A prompt together with its template text.
#[derive(Debug, Clone)]
pub struct PromptDescriptor {
    pub prompt: Prompt,
    pub template: String,
}

impl PromptDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            prompt: Prompt {
                name: name.into(),
                description: description.into(),
                arguments: Vec::new(),
            },
            template: template.into(),
        }
    }

    /// Declare an argument.
    pub fn argument(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.prompt.arguments.push(PromptArgument {
            name: name.into(),
            description: description.into(),
            required,
        });
        self
    }
}

fn conditional_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)\{\{#if ([A-Za-z_][A-Za-z0-9_]*)\}\}(.*?)\{\{/if\}\}")
            .expect("conditional pattern is valid")
    })
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("placeholder pattern is valid")
    })
}

/// Render a template against the supplied arguments.
///
/// Sections whose argument is absent or empty are dropped; unknown
/// placeholders render as empty text.
pub fn render(template: &str, arguments: &HashMap<String, String>) -> String {
    let present = |name: &str| arguments.get(name).is_some_and(|v| !v.is_empty());

    let text = conditional_pattern().replace_all(template, |caps: &Captures| {
        if present(&caps[1]) {
            caps[2].to_string()
        } else {
            String::new()
        }
    });

    placeholder_pattern()
        .replace_all(&text, |caps: &Captures| {
            arguments.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Prompt registry, in registration order.
#[derive(Debug, Default)]
pub struct PromptRegistry {
    prompts: RwLock<Vec<PromptDescriptor>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt. A prompt with the same name is replaced.
    pub async fn register(&self, descriptor: PromptDescriptor) {
        let mut prompts = self.prompts.write().await;
        match prompts
            .iter_mut()
            .find(|p| p.prompt.name == descriptor.prompt.name)
        {
            Some(existing) => *existing = descriptor,
            None => prompts.push(descriptor),
        }
    }

    /// List all prompts.
    pub async fn list(&self) -> Vec<Prompt> {
        self.prompts
            .read()
            .await
            .iter()
            .map(|p| p.prompt.clone())
            .collect()
    }

    /// Get a prompt by name with arguments substituted.
    pub async fn get(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> Result<GetPromptResult> {
        let prompts = self.prompts.read().await;
        let descriptor = prompts
            .iter()
            .find(|p| p.prompt.name == name)
            .ok_or_else(|| Error::PromptNotFound(name.to_string()))?;

        if let Some(missing) = descriptor
            .prompt
            .arguments
            .iter()
            .find(|arg| arg.required && !arguments.contains_key(&arg.name))
        {
            return Err(Error::InvalidParams(format!(
                "Missing required argument '{}' for prompt '{}'",
                missing.name, name
            )));
        }

        let text = render(&descriptor.template, arguments);
        Ok(GetPromptResult {
            description: Some(descriptor.prompt.description.clone()),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: PromptContent::Text { text },
            }],
        })
    }

    /// Number of registered prompts.
    pub async fn count(&self) -> usize {
        self.prompts.read().await.len()
    }
}
