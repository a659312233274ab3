//! Text utilities registered under the `text` namespace.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::mcp::registry::{
    get_optional_string_arg, get_string_arg, ToolArguments, ToolDescriptor, ToolHandler,
    ToolProvider,
};

/// Echo tool.
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, args: ToolArguments) -> Result<Value> {
        let query = get_string_arg(&args, "query")?;
        Ok(Value::String(query))
    }
}

/// Word count tool.
pub struct WordCountTool;

#[async_trait]
impl ToolHandler for WordCountTool {
    async fn call(&self, args: ToolArguments) -> Result<Value> {
        let text = get_optional_string_arg(&args, "query").unwrap_or_default();
        Ok(json!({
            "words": text.split_whitespace().count(),
            "characters": text.chars().count(),
            "lines": text.lines().count(),
        }))
    }
}

/// Provider for the `text.*` tools.
pub struct TextTools;

impl ToolProvider for TextTools {
    fn namespace(&self) -> &str {
        "text"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("echo", EchoTool)
                .with_description("Return the `query` argument unchanged."),
            ToolDescriptor::new("word_count", WordCountTool).with_description(
                "Count words, characters and lines in the `query` argument.\n\
                 Whitespace-separated tokens count as words.",
            ),
        ]
    }
}
