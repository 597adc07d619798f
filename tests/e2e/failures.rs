//! E2E test: failure paths that must not spawn or retry

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcpbridge::connection::ConnectionManager;
use mcpbridge::params::CallMcpToolParams;
use mcpbridge::retry::RetryPolicy;
use mcpbridge::{BridgeConfig, BridgeServer, ServerConfig};
use serde_json::json;

fn stdio_config(name: &str, command: &str) -> Arc<BridgeConfig> {
    let mut servers = HashMap::new();
    servers.insert(
        name.to_string(),
        ServerConfig {
            transport: "stdio".into(),
            command: command.into(),
            args: vec![],
            env: HashMap::new(),
            cwd: None,
            description: None,
            enabled: true,
        },
    );
    Arc::new(BridgeConfig { servers })
}

#[tokio::test]
async fn unknown_server_fails_fast_with_hint_material() {
    let bridge = BridgeServer::new(stdio_config("real", "cat"));

    let err = bridge
        .dispatch_call_tool(CallMcpToolParams {
            server: Some("nope".into()),
            tool: Some("t".into()),
            arguments: Some(json!({})),
            compact: false,
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("unknown server"));

    // Nothing was spawned on the way to the error.
    let stats = bridge.dispatch_stats().await;
    assert_eq!(stats["connected_servers"], json!(0));
}

#[tokio::test]
async fn spawn_failure_is_retryable_and_names_the_command() {
    let config = stdio_config("srv", "mcpbridge-e2e-binary-that-does-not-exist");
    let manager = ConnectionManager::new(config, Duration::from_secs(5));

    let err = manager.list_tools("srv").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.is_connection_error());
    assert!(
        err.to_string().contains("mcpbridge-e2e-binary-that-does-not-exist"),
        "error should carry the command for diagnosis: {err}"
    );
}

#[test]
fn retry_delays_stay_inside_the_specified_envelope() {
    let policy = RetryPolicy::default();
    for attempt in 0..8u32 {
        let cap = (policy.base_delay.as_secs_f64() * policy.multiplier.powi(attempt as i32))
            .min(policy.max_delay.as_secs_f64());
        for _ in 0..100 {
            let d = policy.delay(attempt).as_secs_f64();
            assert!(d >= 0.0);
            assert!(d <= cap * 1.25 + f64::EPSILON);
        }
    }
}
