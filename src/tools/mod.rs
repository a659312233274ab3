//! Tools shipped with the server binary.
//!
//! - `text` - Text utilities (`text.echo`, `text.word_count`)

pub mod text;

use crate::error::Result;
use crate::mcp::registry::ToolRegistry;

/// Register every bundled provider. Returns the number of tools registered.
pub async fn register_all_tools(registry: &ToolRegistry) -> Result<usize> {
    registry.register_provider(&text::TextTools).await
}
