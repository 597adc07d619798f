//! Payload classification, previews, and summaries
//!
//! Pure functions over `serde_json::Value`. Classification is structural
//! only: byte size of the JSON encoding and sequence lengths. Nothing here
//! inspects what the values mean, and nothing here mutates the payload.

use serde_json::{json, Map, Value};

/// Thresholds governing when and how payloads are compacted.
#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Payloads whose JSON encoding exceeds this many bytes are compacted.
    pub size_threshold: usize,
    /// Sequences longer than this are compacted.
    pub row_threshold: usize,
    /// Number of leading elements shown in a sequence preview.
    pub max_preview_rows: usize,
    /// Maximum characters of a string shown in a preview.
    pub max_preview_chars: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            size_threshold: 2_000,
            row_threshold: 20,
            max_preview_rows: 5,
            max_preview_chars: 500,
        }
    }
}

const PREVIEW_NOTE: &str = "fetch remaining via get_result(result_id)";

/// Conventional keys whose sequence lengths are surfaced in summaries.
const COUNTED_KEYS: [(&str, &str); 3] = [
    ("rows", "row_count"),
    ("data", "data_count"),
    ("results", "results_count"),
];

/// Byte length of the payload's UTF-8 JSON encoding.
pub fn payload_size(value: &Value) -> usize {
    serde_json::to_string(value).map(|s| s.len()).unwrap_or(0)
}

impl CompactionConfig {
    /// Whether a payload is large enough to be stored and previewed.
    ///
    /// Thresholds are strict: a payload at exactly `size_threshold` bytes or
    /// a sequence of exactly `row_threshold` elements passes through.
    pub fn is_large(&self, value: &Value) -> bool {
        if payload_size(value) > self.size_threshold {
            return true;
        }
        match value {
            Value::Array(items) => items.len() > self.row_threshold,
            Value::Object(map) => map.values().any(|v| {
                matches!(v, Value::Array(items) if items.len() > self.row_threshold)
            }),
            _ => false,
        }
    }

    /// Derive the immediate preview shown alongside a stored result.
    pub fn preview(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.truncate_string(s)),
            Value::Array(items) => self.sequence_envelope(items),
            Value::Object(map) => Value::Object(self.preview_map(map)),
            scalar => scalar.clone(),
        }
    }

    /// Walk a mapping, enveloping long sequences and truncating long
    /// strings at any depth.
    fn preview_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        map.iter()
            .map(|(key, v)| {
                let shown = match v {
                    Value::Array(items) if items.len() > self.max_preview_rows => {
                        self.sequence_envelope(items)
                    }
                    Value::String(s) if s.chars().count() > self.max_preview_chars => {
                        Value::String(self.truncate_string(s))
                    }
                    Value::Object(inner) => Value::Object(self.preview_map(inner)),
                    other => other.clone(),
                };
                (key.clone(), shown)
            })
            .collect()
    }

    /// Build the summary stored with a result and returned in its envelope.
    pub fn summarize(&self, server: &str, tool: &str, value: &Value) -> Value {
        let size = payload_size(value);
        let mut summary = json!({
            "server": server,
            "tool": tool,
            "size_bytes": size,
            "size_human": human_size(size),
        });
        let extra = match value {
            Value::Array(items) => json!({"type": "array", "item_count": items.len()}),
            Value::Object(map) => {
                let mut obj = json!({
                    "type": "object",
                    "keys": map.keys().collect::<Vec<_>>(),
                });
                for (key, field) in COUNTED_KEYS {
                    if let Some(Value::Array(items)) = map.get(key) {
                        obj[field] = json!(items.len());
                    }
                }
                obj
            }
            Value::String(_) => json!({"type": "string"}),
            Value::Number(_) => json!({"type": "number"}),
            Value::Bool(_) => json!({"type": "boolean"}),
            Value::Null => json!({"type": "null"}),
        };
        if let (Value::Object(summary), Value::Object(extra)) = (&mut summary, extra) {
            summary.extend(extra);
        }
        summary
    }

    fn sequence_envelope(&self, items: &[Value]) -> Value {
        let showing = items.len().min(self.max_preview_rows);
        json!({
            "_preview": true,
            "total_items": items.len(),
            "showing": showing,
            "items": items[..showing].to_vec(),
            "_note": PREVIEW_NOTE,
        })
    }

    fn truncate_string(&self, s: &str) -> String {
        if s.chars().count() <= self.max_preview_chars {
            return s.to_string();
        }
        let mut out: String = s.chars().take(self.max_preview_chars).collect();
        out.push_str("... [truncated]");
        out
    }
}

fn human_size(bytes: usize) -> String {
    if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
