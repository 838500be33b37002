//! Tool handler trait.

use anyhow::Result;
use forcelink_mcp_types::{CallToolResult, Tool};
use serde_json::Value;

/// A tool the server can list and invoke.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// The tool definition.
    fn tool(&self) -> Tool;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Value) -> Result<CallToolResult>;
}
