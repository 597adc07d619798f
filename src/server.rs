//! The bridge MCP server: eight meta-tools in front of many downstream servers
//!
//! Each meta-tool handler validates its inputs, orchestrates the engine
//! components, and returns either a JSON body or an error envelope
//! `{error, server?, tool?, elapsed_ms?, hint}` flagged as a tool error.
//! The dispatch logic lives in plain methods so tests can drive it without
//! the MCP transport.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, RawContent, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde_json::{json, Value};

use crate::cache::ToolCache;
use crate::compact::CompactionConfig;
use crate::config::BridgeConfig;
use crate::connection::{ConnectionManager, DEFAULT_CONNECT_TIMEOUT};
use crate::error::BridgeError;
use crate::params::*;
use crate::retry::RetryPolicy;
use crate::store::ResultStore;
use crate::types::ToolDescriptor;

/// How long fetched tool lists stay fresh.
const TOOL_CACHE_TTL: Duration = Duration::from_secs(300);

/// How long stored results stay retrievable.
const RESULT_TTL: Duration = Duration::from_secs(600);

/// Verbose tool listings cap descriptions at this many characters.
const MAX_DESCRIPTION_CHARS: usize = 100;

/// The bridge MCP server.
#[derive(Clone)]
pub struct BridgeServer {
    config: Arc<BridgeConfig>,
    connections: ConnectionManager,
    tool_cache: ToolCache,
    results: ResultStore,
    retry: RetryPolicy,
    compaction: CompactionConfig,
    started_at: Instant,
    tool_router: ToolRouter<Self>,
}

impl BridgeServer {
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        Self {
            connections: ConnectionManager::new(config.clone(), DEFAULT_CONNECT_TIMEOUT),
            tool_cache: ToolCache::new(TOOL_CACHE_TTL),
            results: ResultStore::new(RESULT_TTL),
            retry: RetryPolicy::default(),
            compaction: CompactionConfig::default(),
            started_at: Instant::now(),
            config,
            tool_router: Self::tool_router(),
        }
    }

    /// The result store, so the binary can start the expiry sweep.
    pub fn result_store(&self) -> &ResultStore {
        &self.results
    }

    /// Close every downstream connection.
    pub async fn shutdown(&self) {
        self.connections.shutdown().await;
    }

    // ========================================================================
    // Dispatch logic (transport-independent)
    // ========================================================================

    /// Enabled servers projected to `{name, description, status}`. Never
    /// touches a child process.
    pub async fn dispatch_list_servers(&self) -> Value {
        let connected = self.connections.connected_names().await;
        let servers: Vec<Value> = self
            .config
            .enabled_server_names()
            .into_iter()
            .map(|name| {
                let description = self
                    .config
                    .get(&name)
                    .and_then(|d| d.description.clone())
                    .unwrap_or_default();
                let status = if connected.contains(&name) {
                    "connected"
                } else {
                    "idle"
                };
                json!({"name": name, "description": description, "status": status})
            })
            .collect();
        json!({"count": servers.len(), "servers": servers})
    }

    /// Tool list for one server, bare names or `{name, description}`.
    pub async fn dispatch_list_tools(
        &self,
        params: ListMcpToolsParams,
    ) -> Result<Value, BridgeError> {
        let server = require(params.server, "server")?;
        let tools = self.server_tools(&server, params.refresh).await?;

        let listed: Vec<Value> = if params.verbose {
            tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": truncate_chars(
                            t.description.as_deref().unwrap_or(""),
                            MAX_DESCRIPTION_CHARS,
                        ),
                    })
                })
                .collect()
        } else {
            tools.iter().map(|t| json!(t.name)).collect()
        };

        Ok(json!({
            "server": server,
            "count": listed.len(),
            "tools": listed,
            "hint": "use get_tool_schema(server, tool) to see a tool's parameters",
        }))
    }

    /// Input schema for one tool.
    pub async fn dispatch_tool_schema(
        &self,
        params: GetToolSchemaParams,
    ) -> Result<Value, BridgeError> {
        let server = require(params.server, "server")?;
        let tool = require(params.tool, "tool")?;

        let tools = self.server_tools(&server, false).await?;
        let found = tools.iter().find(|t| t.name == tool).ok_or_else(|| {
            let available: Vec<&str> = tools.iter().take(10).map(|t| t.name.as_str()).collect();
            BridgeError::ToolNotFound {
                server: server.clone(),
                tool: tool.clone(),
                available: available.join(", "),
            }
        })?;

        Ok(json!({
            "server": server,
            "name": found.name,
            "description": found.description,
            "input_schema": found.input_schema,
        }))
    }

    /// Invoke a downstream tool with retry, then pass through or compact.
    pub async fn dispatch_call_tool(
        &self,
        params: CallMcpToolParams,
    ) -> Result<Value, BridgeError> {
        let server = require(params.server, "server")?;
        let tool = require(params.tool, "tool")?;
        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        let started = Instant::now();
        let result = self.call_with_retry(&server, &tool, &arguments).await?;

        if result.is_error == Some(true) {
            return Err(BridgeError::DownstreamTool {
                name: server,
                tool,
                reason: first_text(&result).unwrap_or_else(|| "tool reported an error".into()),
            });
        }

        let payload = extract_payload(&result);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if params.compact || self.compaction.is_large(&payload) {
            let mut envelope = self.compact_and_store(&server, &tool, payload).await;
            envelope["elapsed_ms"] = json!(elapsed_ms);
            Ok(envelope)
        } else {
            Ok(json!({"compacted": false, "data": payload}))
        }
    }

    /// Fetch a stored full payload by id.
    pub async fn dispatch_get_result(&self, params: GetResultParams) -> Result<Value, BridgeError> {
        let result_id = require(params.result_id, "result_id")?;
        let retrieved = self.results.get(&result_id).await?;
        Ok(json!({
            "result_id": result_id,
            "age_seconds": retrieved.age_seconds,
            "data": retrieved.payload,
        }))
    }

    /// Every live stored result with age and expiry.
    pub async fn dispatch_list_results(&self) -> Value {
        let results = self.results.list().await;
        json!({"count": results.len(), "results": results})
    }

    /// Probe one or all enabled servers by fetching their tool lists.
    /// Per-server failures are captured in the records, never propagated.
    pub async fn dispatch_health(&self, params: CheckServerHealthParams) -> Value {
        let targets = match params.server {
            Some(server) => vec![server],
            None => self.config.enabled_server_names(),
        };

        let mut records = Vec::with_capacity(targets.len());
        let mut healthy = 0usize;
        for name in &targets {
            let started = Instant::now();
            let record = match self.server_tools(name, false).await {
                Ok(tools) => {
                    healthy += 1;
                    json!({
                        "server": name,
                        "status": "healthy",
                        "response_time_ms": started.elapsed().as_millis() as u64,
                        "tool_count": tools.len(),
                    })
                }
                Err(e) => json!({
                    "server": name,
                    "status": "error",
                    "response_time_ms": started.elapsed().as_millis() as u64,
                    "error": e.to_string(),
                }),
            };
            records.push(record);
        }

        json!({"checked": targets.len(), "healthy": healthy, "servers": records})
    }

    /// Runtime statistics. `cached_tools` is the flattened tool count
    /// across cache entries; `cache_entries` counts the entries.
    pub async fn dispatch_stats(&self) -> Value {
        let (resident_mb, virtual_mb) = process_memory_mb();
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "configured_servers": self.config.servers.len(),
            "connected_servers": self.connections.connected_count().await,
            "cached_tools": self.tool_cache.tool_count().await,
            "cache_entries": self.tool_cache.entry_count().await,
            "memory": {"resident_mb": resident_mb, "virtual_mb": virtual_mb},
            "uptime_seconds": self.started_at.elapsed().as_secs(),
            "compaction": {
                "size_threshold": self.compaction.size_threshold,
                "row_threshold": self.compaction.row_threshold,
                "max_preview_rows": self.compaction.max_preview_rows,
                "max_preview_chars": self.compaction.max_preview_chars,
            },
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Tool descriptors for a server, from the cache when fresh.
    async fn server_tools(
        &self,
        server: &str,
        refresh: bool,
    ) -> Result<Vec<ToolDescriptor>, BridgeError> {
        if refresh {
            self.tool_cache.invalidate(server).await;
        } else if let Some(tools) = self.tool_cache.get(server).await {
            return Ok(tools);
        }

        let tools = self.connections.list_tools(server).await?;
        self.tool_cache.put(server, tools.clone()).await;
        Ok(tools)
    }

    /// The retry loop around one downstream call. Connection-class errors
    /// evict the cached handle before the next attempt; the final error
    /// carries the attempt count.
    async fn call_with_retry(
        &self,
        server: &str,
        tool: &str,
        arguments: &Value,
    ) -> Result<CallToolResult, BridgeError> {
        let mut attempt: u32 = 0;
        loop {
            match self
                .connections
                .call_tool(server, tool, Some(arguments.clone()))
                .await
            {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_retryable() || attempt >= self.retry.max_retries {
                        return Err(after_attempts(e, attempt + 1));
                    }
                    if e.is_connection_error() {
                        self.connections.disconnect(server).await;
                    }
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        server,
                        tool,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying downstream call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Store a large payload and build the compacted envelope.
    async fn compact_and_store(&self, server: &str, tool: &str, payload: Value) -> Value {
        let summary = self.compaction.summarize(server, tool, &payload);
        let preview = self.compaction.preview(&payload);
        let now_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let result_id = self.results.make_id(server, tool, now_millis);
        self.results
            .insert(result_id.clone(), payload, summary.clone())
            .await;

        let hint = format!(
            "full result stored for {}s; fetch it with get_result(\"{}\")",
            self.results.ttl().as_secs(),
            result_id,
        );
        json!({
            "compacted": true,
            "result_id": result_id,
            "summary": summary,
            "preview": preview,
            "hint": hint,
        })
    }

    /// Build the user-visible error envelope.
    fn error_response(
        &self,
        err: &BridgeError,
        server: Option<&str>,
        tool: Option<&str>,
        elapsed_ms: Option<u64>,
    ) -> CallToolResult {
        let mut body = json!({
            "error": err.to_string(),
            "hint": self.hint_for(err),
        });
        if let Some(server) = server {
            body["server"] = json!(server);
        }
        if let Some(tool) = tool {
            body["tool"] = json!(tool);
        }
        if let Some(elapsed_ms) = elapsed_ms {
            body["elapsed_ms"] = json!(elapsed_ms);
        }
        CallToolResult {
            content: vec![Content::text(json_text(&body))],
            is_error: Some(true),
            meta: Default::default(),
            structured_content: None,
        }
    }

    /// Actionable recovery hint per error kind.
    fn hint_for(&self, err: &BridgeError) -> String {
        match err {
            BridgeError::UnknownServer(_) | BridgeError::ArgumentMissing("server") => {
                format!(
                    "available servers: {}",
                    self.config.enabled_server_names().join(", ")
                )
            }
            BridgeError::ServerDisabled(_) => {
                "enable the server in mcpbridge.config.json, or use list_servers to see enabled servers".to_string()
            }
            BridgeError::ConnectTimeout { .. } => {
                "the server may still be starting up; retry the call".to_string()
            }
            BridgeError::SpawnFailed { .. } => {
                "the server command was not found or failed to start; check the \"command\" path in mcpbridge.config.json".to_string()
            }
            BridgeError::ToolNotFound { .. } => {
                "use list_mcp_tools(server) to see the available tools".to_string()
            }
            BridgeError::ResultMissing(_) | BridgeError::ResultExpired(_) => {
                "use list_results() to see the currently stored results".to_string()
            }
            _ => "use list_servers() and list_mcp_tools(server) to discover what is available"
                .to_string(),
        }
    }
}

// ============================================================================
// Tool Router - thin wrappers over the dispatch methods
// ============================================================================

#[tool_router]
impl BridgeServer {
    #[tool(
        description = "List the downstream MCP servers this bridge can reach, with their status."
    )]
    async fn list_servers(&self) -> Result<CallToolResult, McpError> {
        json_response(&self.dispatch_list_servers().await)
    }

    #[tool(
        description = "List the tools of one downstream server. Returns bare names by default; set verbose=true for descriptions, refresh=true to bypass the schema cache."
    )]
    async fn list_mcp_tools(
        &self,
        Parameters(params): Parameters<ListMcpToolsParams>,
    ) -> Result<CallToolResult, McpError> {
        let server = params.server.clone();
        match self.dispatch_list_tools(params).await {
            Ok(body) => json_response(&body),
            Err(e) => Ok(self.error_response(&e, server.as_deref(), None, None)),
        }
    }

    #[tool(description = "Get the full input schema of one downstream tool.")]
    async fn get_tool_schema(
        &self,
        Parameters(params): Parameters<GetToolSchemaParams>,
    ) -> Result<CallToolResult, McpError> {
        let server = params.server.clone();
        let tool = params.tool.clone();
        match self.dispatch_tool_schema(params).await {
            Ok(body) => json_response(&body),
            Err(e) => Ok(self.error_response(&e, server.as_deref(), tool.as_deref(), None)),
        }
    }

    #[tool(
        description = "Invoke a tool on a downstream server. Large results are stored and returned as a preview with a result_id; fetch the full payload with get_result."
    )]
    async fn call_mcp_tool(
        &self,
        Parameters(params): Parameters<CallMcpToolParams>,
    ) -> Result<CallToolResult, McpError> {
        let server = params.server.clone();
        let tool = params.tool.clone();
        let started = Instant::now();
        match self.dispatch_call_tool(params).await {
            Ok(body) => json_response(&body),
            Err(e) => Ok(self.error_response(
                &e,
                server.as_deref(),
                tool.as_deref(),
                Some(started.elapsed().as_millis() as u64),
            )),
        }
    }

    #[tool(description = "Fetch the full payload of a stored result by its result_id.")]
    async fn get_result(
        &self,
        Parameters(params): Parameters<GetResultParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.dispatch_get_result(params).await {
            Ok(body) => json_response(&body),
            Err(e) => Ok(self.error_response(&e, None, None, None)),
        }
    }

    #[tool(description = "List all stored results with their age and time to expiry.")]
    async fn list_results(&self) -> Result<CallToolResult, McpError> {
        json_response(&self.dispatch_list_results().await)
    }

    #[tool(
        description = "Check the health of one server (or all enabled servers) by fetching its tool list."
    )]
    async fn check_server_health(
        &self,
        Parameters(params): Parameters<CheckServerHealthParams>,
    ) -> Result<CallToolResult, McpError> {
        json_response(&self.dispatch_health(params).await)
    }

    #[tool(description = "Bridge runtime statistics: servers, caches, memory, uptime.")]
    async fn get_bridge_stats(&self) -> Result<CallToolResult, McpError> {
        json_response(&self.dispatch_stats().await)
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for BridgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Bridge to multiple downstream MCP servers. Start with list_servers, \
                 then list_mcp_tools(server) and get_tool_schema(server, tool), and \
                 invoke tools with call_mcp_tool. Large results come back as previews; \
                 fetch the full payload with get_result(result_id)."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn require(value: Option<String>, name: &'static str) -> Result<String, BridgeError> {
    value.ok_or(BridgeError::ArgumentMissing(name))
}

/// Canonical payload of a downstream result: the first text content decoded
/// as JSON when possible (raw string otherwise), or the whole result value
/// when no text content is present.
fn extract_payload(result: &CallToolResult) -> Value {
    match first_text(result) {
        Some(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        None => serde_json::to_value(result).unwrap_or(Value::Null),
    }
}

fn first_text(result: &CallToolResult) -> Option<String> {
    result.content.iter().find_map(|c| match &c.raw {
        RawContent::Text(t) => Some(t.text.clone()),
        _ => None,
    })
}

/// Append the attempt count once retries are exhausted, keeping the error
/// kind (and so the hint) intact.
fn after_attempts(err: BridgeError, attempts: u32) -> BridgeError {
    if attempts <= 1 {
        return err;
    }
    match err {
        BridgeError::DownstreamTransport { name, reason } => BridgeError::DownstreamTransport {
            name,
            reason: format!("{reason} (after {attempts} attempts)"),
        },
        BridgeError::SpawnFailed {
            name,
            command,
            reason,
        } => BridgeError::SpawnFailed {
            name,
            command,
            reason: format!("{reason} (after {attempts} attempts)"),
        },
        other => other,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

fn json_text(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn json_response(value: &Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(json_text(
        value,
    ))]))
}

fn process_memory_mb() -> (f64, f64) {
    let mut sys = sysinfo::System::new();
    if let Ok(pid) = sysinfo::get_current_pid() {
        sys.refresh_process(pid);
        if let Some(process) = sys.process(pid) {
            const MIB: f64 = 1024.0 * 1024.0;
            let round1 = |x: f64| (x * 10.0).round() / 10.0;
            return (
                round1(process.memory() as f64 / MIB),
                round1(process.virtual_memory() as f64 / MIB),
            );
        }
    }
    (0.0, 0.0)
}
