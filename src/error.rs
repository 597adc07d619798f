//! Error types for the bridge engine
//!
//! One enum covers every failure the dispatcher can surface. Classification
//! into retryable / connection errors drives the retry loop: transport-class
//! faults are retried, everything else propagates on first occurrence.

use std::time::Duration;

use thiserror::Error;

/// Unified error type for the bridge engine.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration file missing, unreadable, or unparseable.
    #[error("config error: {0}")]
    Config(String),

    /// No descriptor with this name exists.
    #[error("unknown server '{0}'")]
    UnknownServer(String),

    /// The descriptor exists but is disabled.
    #[error("server '{0}' is disabled")]
    ServerDisabled(String),

    /// The descriptor requests a transport other than stdio.
    #[error("server '{name}' uses unsupported transport '{transport}' (only \"stdio\" is supported)")]
    UnsupportedTransport { name: String, transport: String },

    /// The child process could not be spawned or failed to initialize.
    #[error("failed to start '{command}' for server '{name}': {reason}")]
    SpawnFailed {
        name: String,
        command: String,
        reason: String,
    },

    /// The connect handshake did not complete within the timeout.
    #[error("connection to server '{name}' timed out after {timeout:?}")]
    ConnectTimeout { name: String, timeout: Duration },

    /// The established connection failed mid-operation.
    #[error("transport error from server '{name}': {reason}")]
    DownstreamTransport { name: String, reason: String },

    /// The server is reachable but has no tool with this name.
    #[error("tool '{tool}' not found on server '{server}' (available: {available})")]
    ToolNotFound {
        server: String,
        tool: String,
        available: String,
    },

    /// The downstream tool executed and reported an error.
    #[error("server '{name}' returned an error for tool '{tool}': {reason}")]
    DownstreamTool {
        name: String,
        tool: String,
        reason: String,
    },

    /// No stored result under this id.
    #[error("result '{0}' not found")]
    ResultMissing(String),

    /// The stored result outlived its TTL.
    #[error("result '{0}' has expired")]
    ResultExpired(String),

    /// A required meta-tool argument was omitted.
    #[error("missing required argument '{0}'")]
    ArgumentMissing(&'static str),
}

impl BridgeError {
    /// Whether the retry loop should attempt this operation again.
    ///
    /// Transport-class variants always retry. Transport errors whose message
    /// indicates a deterministic downstream condition do not arise here (the
    /// downstream reports those as tool errors, mapped to `DownstreamTool`).
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::SpawnFailed { .. } | BridgeError::ConnectTimeout { .. } => true,
            BridgeError::DownstreamTransport { reason, .. } => retryable_message(reason),
            _ => false,
        }
    }

    /// Whether the cached connection should be dropped before the next attempt.
    pub fn is_connection_error(&self) -> bool {
        match self {
            BridgeError::SpawnFailed { .. } | BridgeError::ConnectTimeout { .. } => true,
            BridgeError::DownstreamTransport { reason, .. } => {
                let m = reason.to_lowercase();
                m.contains("connect") || m.contains("spawn") || m.contains("enoent")
            }
            _ => false,
        }
    }
}

/// Message-level classification of transport faults.
///
/// Matches the failure modes a child-process transport can produce: refused
/// or reset pipes, missing executables, timeouts, and DNS-ish resolution
/// failures from servers that proxy further out.
pub fn retryable_message(message: &str) -> bool {
    let m = message.to_lowercase();
    const PATTERNS: [&str; 9] = [
        "connection refused",
        "econnrefused",
        "enoent",
        "not found",
        "reset",
        "timeout",
        "timed out",
        "spawn",
        "socket hang up",
    ];
    PATTERNS.iter().any(|p| m.contains(p)) || m.contains("dns")
}
