//! mcpbridge - MCP meta-protocol proxy
//!
//! Presents a single MCP server with a small fixed set of meta-tools and
//! multiplexes them onto an arbitrary set of downstream MCP servers, spawned
//! lazily as child processes over stdio. Oversized downstream results are
//! compacted into previews backed by a short-lived in-memory result store.

pub mod cache;
pub mod compact;
pub mod config;
pub mod connection;
pub mod error;
pub mod params;
pub mod retry;
pub mod server;
pub mod store;
pub mod types;

pub use config::{BridgeConfig, ServerConfig};
pub use error::BridgeError;
pub use server::BridgeServer;
