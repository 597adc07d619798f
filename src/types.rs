//! Shared type definitions

use serde::Serialize;
use serde_json::Value;

/// A tool advertised by a downstream MCP server.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: Option<String>,
    /// Input schema (JSON)
    pub input_schema: Option<Value>,
}
