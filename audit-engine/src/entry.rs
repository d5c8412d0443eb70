//! The audit log row shape (§4 AuditLog, §6 `audit_log` table).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single audit-log row. `signature`/`signing_kek_id` are `None` for
/// legacy unsigned rows, preserved for backward compatibility (§9 open
/// question: whether new deployments should reject null signatures on
/// write is left to the deployer — `AuditChain::append` always signs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub client_id: String,
    pub action: String,
    pub resource_path: String,
    pub success: bool,
    pub metadata: serde_json::Value,
    pub signature: Option<[u8; 32]>,
    pub signing_kek_id: Option<Uuid>,
}

impl AuditLog {
    /// The fixed canonical ordering signed over: `(id, timestamp_rfc3339_nanos,
    /// client_id, action, resource_path, success, metadata_json_canonical)`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true).as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.client_id.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.action.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.resource_path.as_bytes());
        buf.push(0);
        buf.push(self.success as u8);
        buf.push(0);
        buf.extend_from_slice(canonical_json(&self.metadata).as_bytes());
        buf
    }
}

/// Sorted-key, whitespace-free JSON, the only canonical form the chain
/// ever signs or re-derives over.
pub fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
