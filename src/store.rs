//! In-memory result store
//!
//! Full payloads of compacted results live here until their TTL lapses.
//! Correctness rests on the read-path age check; the background sweep only
//! bounds memory between reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::BridgeError;

/// Interval between background expiry sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A stored downstream payload with its summary and creation time.
struct StoredResult {
    payload: Value,
    summary: Value,
    created_at: Instant,
}

/// Result returned by [`ResultStore::get`].
#[derive(Debug)]
pub struct RetrievedResult {
    pub payload: Value,
    pub age_seconds: u64,
}

/// Id-keyed store of full results with TTL-bounded retrieval.
#[derive(Clone)]
pub struct ResultStore {
    entries: Arc<RwLock<HashMap<String, StoredResult>>>,
    counter: Arc<AtomicU64>,
    ttl: Duration,
}

impl ResultStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            counter: Arc::new(AtomicU64::new(0)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Allocate a result id: `<server>_<tool>_<base36 millis>_<base36 counter>`.
    ///
    /// The counter is process-lifetime monotonic, so ids stay unique even
    /// when two results for the same tool land in the same millisecond.
    pub fn make_id(&self, server: &str, tool: &str, now_millis: u64) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}_{}", server, tool, base36(now_millis), base36(seq))
    }

    pub async fn insert(&self, id: String, payload: Value, summary: Value) {
        let mut entries = self.entries.write().await;
        entries.insert(
            id,
            StoredResult {
                payload,
                summary,
                created_at: Instant::now(),
            },
        );
    }

    /// Fetch a stored payload. An entry past its TTL is removed and
    /// reported as expired even if the sweep has not run yet.
    pub async fn get(&self, id: &str) -> Result<RetrievedResult, BridgeError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get(id)
            .ok_or_else(|| BridgeError::ResultMissing(id.to_string()))?;

        let age = entry.created_at.elapsed();
        if age > self.ttl {
            entries.remove(id);
            return Err(BridgeError::ResultExpired(id.to_string()));
        }

        Ok(RetrievedResult {
            payload: entry.payload.clone(),
            age_seconds: age.as_secs(),
        })
    }

    /// List every live entry with its age and time to expiry.
    pub async fn list(&self) -> Vec<Value> {
        let entries = self.entries.read().await;
        let ttl = self.ttl.as_secs();
        let mut listed: Vec<Value> = entries
            .iter()
            .filter(|(_, e)| e.created_at.elapsed() <= self.ttl)
            .map(|(id, e)| {
                let age = e.created_at.elapsed().as_secs();
                json!({
                    "result_id": id,
                    "summary": e.summary,
                    "age_seconds": age,
                    "expires_in_seconds": ttl.saturating_sub(age),
                })
            })
            .collect();
        listed.sort_by(|a, b| a["result_id"].as_str().cmp(&b["result_id"].as_str()));
        listed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Remove every expired entry; returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.created_at.elapsed() <= self.ttl);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "expired results swept");
        }
        removed
    }

    /// Spawn the cooperative background sweep. Missed ticks are harmless;
    /// the read path re-checks ages anyway.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                store.sweep().await;
            }
        })
    }

    /// Insert an entry that was created `age` ago. Lets expiry paths be
    /// tested without sleeping through the TTL.
    #[cfg(test)]
    pub async fn insert_backdated(&self, id: String, payload: Value, summary: Value, age: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            id,
            StoredResult {
                payload,
                summary,
                created_at: Instant::now() - age,
            },
        );
    }
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(DIGITS[(n % 36) as usize] as char);
        n /= 36;
    }
    digits.iter().rev().collect()
}
