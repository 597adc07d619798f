//! E2E tests against a real downstream MCP server
//!
//! These spawn an actual child process and exercise the full connect /
//! list / call path. Point `MCPBRIDGE_E2E_COMMAND` at any stdio MCP server
//! binary, then run with `--include-ignored`.

use std::collections::HashMap;
use std::sync::Arc;

use mcpbridge::params::{CallMcpToolParams, CheckServerHealthParams, ListMcpToolsParams};
use mcpbridge::{BridgeConfig, BridgeServer, ServerConfig};
use serde_json::json;

fn live_config() -> Option<Arc<BridgeConfig>> {
    let command = std::env::var("MCPBRIDGE_E2E_COMMAND").ok()?;
    let mut parts = command.split_whitespace();
    let program = parts.next()?.to_string();
    let args: Vec<String> = parts.map(|s| s.to_string()).collect();

    let mut servers = HashMap::new();
    servers.insert(
        "live".to_string(),
        ServerConfig {
            transport: "stdio".into(),
            command: program,
            args,
            env: HashMap::new(),
            cwd: None,
            description: Some("live e2e downstream".into()),
            enabled: true,
        },
    );
    Some(Arc::new(BridgeConfig { servers }))
}

#[tokio::test]
#[ignore = "requires MCPBRIDGE_E2E_COMMAND pointing at a stdio MCP server"]
async fn list_tools_twice_hits_the_cache() {
    let config = live_config().expect("MCPBRIDGE_E2E_COMMAND must be set");
    let bridge = BridgeServer::new(config);

    let first = bridge
        .dispatch_list_tools(ListMcpToolsParams {
            server: Some("live".into()),
            verbose: false,
            refresh: false,
        })
        .await
        .unwrap();

    let second = bridge
        .dispatch_list_tools(ListMcpToolsParams {
            server: Some("live".into()),
            verbose: false,
            refresh: false,
        })
        .await
        .unwrap();

    // Within the TTL both reads see the same cached sequence.
    assert_eq!(first["tools"], second["tools"]);
    assert_eq!(first["count"], second["count"]);
}

#[tokio::test]
#[ignore = "requires MCPBRIDGE_E2E_COMMAND pointing at a stdio MCP server"]
async fn refresh_bypasses_the_cache() {
    let config = live_config().expect("MCPBRIDGE_E2E_COMMAND must be set");
    let bridge = BridgeServer::new(config);

    let fresh = bridge
        .dispatch_list_tools(ListMcpToolsParams {
            server: Some("live".into()),
            verbose: true,
            refresh: true,
        })
        .await
        .unwrap();
    assert!(fresh["count"].as_u64().unwrap() > 0);

    bridge.shutdown().await;
}

#[tokio::test]
#[ignore = "requires MCPBRIDGE_E2E_COMMAND pointing at a stdio MCP server"]
async fn health_check_reports_the_live_server() {
    let config = live_config().expect("MCPBRIDGE_E2E_COMMAND must be set");
    let bridge = BridgeServer::new(config);

    let body = bridge
        .dispatch_health(CheckServerHealthParams { server: None })
        .await;
    assert_eq!(body["checked"], json!(1));
    assert_eq!(body["healthy"], json!(1));
    assert_eq!(body["servers"][0]["status"], json!("healthy"));

    bridge.shutdown().await;
}

#[tokio::test]
#[ignore = "requires MCPBRIDGE_E2E_COMMAND and MCPBRIDGE_E2E_TOOL"]
async fn call_tool_round_trips_through_the_bridge() {
    let config = live_config().expect("MCPBRIDGE_E2E_COMMAND must be set");
    let tool = std::env::var("MCPBRIDGE_E2E_TOOL").expect("MCPBRIDGE_E2E_TOOL must be set");
    let bridge = BridgeServer::new(config);

    let body = bridge
        .dispatch_call_tool(CallMcpToolParams {
            server: Some("live".into()),
            tool: Some(tool),
            arguments: Some(json!({})),
            compact: false,
        })
        .await
        .unwrap();

    assert!(body["compacted"].is_boolean());

    bridge.shutdown().await;
}
