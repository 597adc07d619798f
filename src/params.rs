//! Parameter types for the bridge meta-tools
//!
//! `server`, `tool`, and `result_id` are modelled as `Option` even though
//! they are required: omission must produce the bridge's own error envelope
//! (with the enabled-server hint) rather than an opaque schema rejection.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListMcpToolsParams {
    #[schemars(description = "Name of the downstream server to list tools from")]
    pub server: Option<String>,

    #[schemars(description = "Include descriptions (default: false, names only)")]
    #[serde(default)]
    pub verbose: bool,

    #[schemars(description = "Bypass the schema cache and refetch (default: false)")]
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetToolSchemaParams {
    #[schemars(description = "Name of the downstream server")]
    pub server: Option<String>,

    #[schemars(description = "Name of the tool to fetch the input schema for")]
    pub tool: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CallMcpToolParams {
    #[schemars(description = "Name of the downstream server")]
    pub server: Option<String>,

    #[schemars(description = "Name of the tool to invoke")]
    pub tool: Option<String>,

    #[schemars(description = "Arguments passed through to the tool unchanged (default: {})")]
    pub arguments: Option<Value>,

    #[schemars(description = "Force compaction even for small results (default: false)")]
    #[serde(default)]
    pub compact: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetResultParams {
    #[schemars(description = "Id returned by a compacted call_mcp_tool response")]
    pub result_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CheckServerHealthParams {
    #[schemars(description = "Check a single server; omit to check all enabled servers")]
    pub server: Option<String>,
}
