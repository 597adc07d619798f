//! E2E test: server discovery never spawns a child process

use std::collections::HashMap;
use std::sync::Arc;

use mcpbridge::{BridgeConfig, BridgeServer, ServerConfig};
use serde_json::json;

fn config_with(servers: Vec<(&str, bool)>) -> Arc<BridgeConfig> {
    let servers = servers
        .into_iter()
        .map(|(name, enabled)| {
            (
                name.to_string(),
                ServerConfig {
                    transport: "stdio".into(),
                    command: "cat".into(),
                    args: vec![],
                    env: HashMap::new(),
                    cwd: None,
                    description: Some(format!("{name} test server")),
                    enabled,
                },
            )
        })
        .collect();
    Arc::new(BridgeConfig { servers })
}

#[tokio::test]
async fn list_servers_reports_enabled_servers_without_spawning() {
    let bridge = BridgeServer::new(config_with(vec![("srv", true)]));

    let body = bridge.dispatch_list_servers().await;
    assert_eq!(body["count"], json!(1));
    assert_eq!(body["servers"][0]["name"], json!("srv"));
    assert_eq!(body["servers"][0]["status"], json!("idle"));

    // No child has been spawned by discovery.
    let stats = bridge.dispatch_stats().await;
    assert_eq!(stats["connected_servers"], json!(0));
}

#[tokio::test]
async fn disabled_servers_are_hidden_from_discovery() {
    let bridge = BridgeServer::new(config_with(vec![("on", true), ("off", false)]));

    let body = bridge.dispatch_list_servers().await;
    assert_eq!(body["count"], json!(1));
    assert_eq!(body["servers"][0]["name"], json!("on"));
}

#[tokio::test]
async fn stats_reflect_configuration_before_any_traffic() {
    let bridge = BridgeServer::new(config_with(vec![("a", true), ("b", true)]));

    let stats = bridge.dispatch_stats().await;
    assert_eq!(stats["configured_servers"], json!(2));
    assert_eq!(stats["cached_tools"], json!(0));
    assert_eq!(stats["cache_entries"], json!(0));
    assert!(stats["memory"]["resident_mb"].is_number());
    assert!(stats["uptime_seconds"].is_number());
}
