//! Per-server tool schema cache
//!
//! Entries carry their fetch time; a read past the TTL misses so the caller
//! refetches from the live connection and replaces the entry atomically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::types::ToolDescriptor;

struct CacheEntry {
    tools: Vec<ToolDescriptor>,
    cached_at: Instant,
}

/// TTL-bounded map of `server name → tool descriptors`.
#[derive(Clone)]
pub struct ToolCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl ToolCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Return the cached tools for a server if the entry is still fresh.
    pub async fn get(&self, server: &str) -> Option<Vec<ToolDescriptor>> {
        let entries = self.entries.read().await;
        let entry = entries.get(server)?;
        if entry.cached_at.elapsed() < self.ttl {
            Some(entry.tools.clone())
        } else {
            None
        }
    }

    /// Replace the entry for a server with a fresh fetch.
    pub async fn put(&self, server: &str, tools: Vec<ToolDescriptor>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            server.to_string(),
            CacheEntry {
                tools,
                cached_at: Instant::now(),
            },
        );
    }

    pub async fn invalidate(&self, server: &str) {
        self.entries.write().await.remove(server);
    }

    /// Number of cache entries (stale ones included until replaced).
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Sum of tool counts across all entries.
    pub async fn tool_count(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .map(|e| e.tools.len())
            .sum()
    }

    /// Insert an entry fetched `age` ago, for TTL tests.
    #[cfg(test)]
    pub async fn put_backdated(&self, server: &str, tools: Vec<ToolDescriptor>, age: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            server.to_string(),
            CacheEntry {
                tools,
                cached_at: Instant::now() - age,
            },
        );
    }
}
