//! Downstream connection manager
//!
//! Owns every child-process MCP client. Connections are created lazily on
//! first use and cached per server; a failed operation drops the handle so
//! the next request rebuilds it. Each server has its own slot mutex, so
//! concurrent requests to one server serialize while different servers
//! connect and call in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rmcp::{
    model::{CallToolRequestParam, CallToolResult},
    service::RunningService,
    transport::TokioChildProcess,
    RoleClient, ServiceExt,
};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::types::ToolDescriptor;

/// Default bound on the connect handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// State guarded by the per-server mutex.
struct ConnectionState {
    service: Option<RunningService<RoleClient, ()>>,
    last_connected_at: Option<Instant>,
}

/// One server's slot: the serialized state plus a lock-free connected flag
/// so status reads never wait behind an in-flight connect.
#[derive(Clone)]
struct Slot {
    state: Arc<Mutex<ConnectionState>>,
    connected: Arc<AtomicBool>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectionState {
                service: None,
                last_connected_at: None,
            })),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Sole owner of downstream client handles.
#[derive(Clone)]
pub struct ConnectionManager {
    config: Arc<BridgeConfig>,
    slots: Arc<RwLock<HashMap<String, Slot>>>,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(config: Arc<BridgeConfig>, connect_timeout: Duration) -> Self {
        Self {
            config,
            slots: Arc::new(RwLock::new(HashMap::new())),
            connect_timeout,
        }
    }

    /// List tools over a live connection, connecting first if needed.
    pub async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>, BridgeError> {
        let slot = self.slot(server).await?;
        let mut state = slot.state.lock().await;
        self.ensure_connected(server, &slot, &mut state).await?;

        let service = live_service(server, &state)?;
        let response = match service.list_tools(Default::default()).await {
            Ok(response) => response,
            Err(e) => {
                drop_handle(&slot, &mut state).await;
                return Err(BridgeError::DownstreamTransport {
                    name: server.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let tools = response
            .tools
            .into_iter()
            .map(|t| ToolDescriptor {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: Some(serde_json::to_value(&t.input_schema).unwrap_or_default()),
            })
            .collect();
        Ok(tools)
    }

    /// Invoke a downstream tool over a live connection.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Option<Value>,
    ) -> Result<CallToolResult, BridgeError> {
        let slot = self.slot(server).await?;
        let mut state = slot.state.lock().await;
        self.ensure_connected(server, &slot, &mut state).await?;

        let service = live_service(server, &state)?;
        let args = arguments.and_then(|v| v.as_object().cloned());
        match service
            .call_tool(CallToolRequestParam {
                name: tool.to_string().into(),
                arguments: args,
            })
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                drop_handle(&slot, &mut state).await;
                Err(BridgeError::DownstreamTransport {
                    name: server.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Drop the cached connection for a server, if any. The next request
    /// rebuilds it from scratch.
    pub async fn disconnect(&self, server: &str) {
        let slot = { self.slots.read().await.get(server).cloned() };
        if let Some(slot) = slot {
            let mut state = slot.state.lock().await;
            if state.service.is_some() {
                tracing::debug!(server, "dropping cached connection");
            }
            drop_handle(&slot, &mut state).await;
        }
    }

    /// Names of servers currently holding a live connection. Lock-free
    /// reads, so an in-flight connect elsewhere never delays this.
    pub async fn connected_names(&self) -> Vec<String> {
        self.slots
            .read()
            .await
            .iter()
            .filter(|(_, slot)| slot.connected.load(Ordering::Acquire))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// How many servers currently hold a live connection.
    pub async fn connected_count(&self) -> usize {
        self.connected_names().await.len()
    }

    /// Close every live connection. Errors are logged and ignored.
    pub async fn shutdown(&self) {
        let slots: Vec<(String, Slot)> = {
            self.slots
                .read()
                .await
                .iter()
                .map(|(name, slot)| (name.clone(), slot.clone()))
                .collect()
        };
        for (name, slot) in slots {
            let mut state = slot.state.lock().await;
            slot.connected.store(false, Ordering::Release);
            if let Some(service) = state.service.take() {
                tracing::info!(server = %name, "closing connection");
                if let Err(e) = service.cancel().await {
                    tracing::warn!(server = %name, error = %e, "error closing connection");
                }
            }
        }
    }

    /// Validate the descriptor and return the per-server slot, creating it
    /// if this is the first request for the server.
    async fn slot(&self, server: &str) -> Result<Slot, BridgeError> {
        let descriptor = self
            .config
            .get(server)
            .ok_or_else(|| BridgeError::UnknownServer(server.to_string()))?;
        if !descriptor.enabled {
            return Err(BridgeError::ServerDisabled(server.to_string()));
        }
        if descriptor.transport != "stdio" {
            return Err(BridgeError::UnsupportedTransport {
                name: server.to_string(),
                transport: descriptor.transport.clone(),
            });
        }

        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(server) {
                return Ok(slot.clone());
            }
        }
        let mut slots = self.slots.write().await;
        Ok(slots
            .entry(server.to_string())
            .or_insert_with(Slot::new)
            .clone())
    }

    /// Spawn the child and complete the MCP handshake, bounded by the
    /// connect timeout. No-op when the slot already holds a live handle.
    async fn ensure_connected(
        &self,
        server: &str,
        slot: &Slot,
        state: &mut ConnectionState,
    ) -> Result<(), BridgeError> {
        if state.service.is_some() {
            return Ok(());
        }

        let descriptor = self
            .config
            .get(server)
            .ok_or_else(|| BridgeError::UnknownServer(server.to_string()))?;

        tracing::info!(server, command = %descriptor.command, "spawning downstream server");

        let mut cmd = Command::new(&descriptor.command);
        if !descriptor.args.is_empty() {
            cmd.args(&descriptor.args);
        }
        for (key, value) in &descriptor.env {
            let expanded = shellexpand::env(value).unwrap_or_else(|_| value.clone().into());
            cmd.env(key, expanded.as_ref());
        }
        if let Some(cwd) = &descriptor.cwd {
            cmd.current_dir(cwd);
        }

        let transport = TokioChildProcess::new(cmd).map_err(|e| BridgeError::SpawnFailed {
            name: server.to_string(),
            command: descriptor.command.clone(),
            reason: e.to_string(),
        })?;

        let service = match tokio::time::timeout(self.connect_timeout, ().serve(transport)).await {
            Ok(Ok(service)) => service,
            Ok(Err(e)) => {
                return Err(BridgeError::SpawnFailed {
                    name: server.to_string(),
                    command: descriptor.command.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(BridgeError::ConnectTimeout {
                    name: server.to_string(),
                    timeout: self.connect_timeout,
                });
            }
        };

        tracing::info!(server, "connected");
        state.service = Some(service);
        state.last_connected_at = Some(Instant::now());
        slot.connected.store(true, Ordering::Release);
        Ok(())
    }
}

fn live_service<'a>(
    server: &str,
    state: &'a ConnectionState,
) -> Result<&'a RunningService<RoleClient, ()>, BridgeError> {
    state
        .service
        .as_ref()
        .ok_or_else(|| BridgeError::DownstreamTransport {
            name: server.to_string(),
            reason: "connection not established".to_string(),
        })
}

/// Cancel and discard a slot's handle, best-effort.
async fn drop_handle(slot: &Slot, state: &mut ConnectionState) {
    slot.connected.store(false, Ordering::Release);
    if let Some(service) = state.service.take() {
        if let Err(e) = service.cancel().await {
            tracing::debug!(error = %e, "error cancelling faulted connection");
        }
    }
}
