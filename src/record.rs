// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Syncable records and their wire encoding.

use crate::error::{ReplicationError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Replication state of a local record.
///
/// `Pending → Sent` is the only transition, and it happens once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Sent,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Sent => "sent",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "sent" => Ok(SyncStatus::Sent),
            other => Err(ReplicationError::Internal(format!("unknown sync status '{}'", other))),
        }
    }
}

/// A sub-record owned by a [`SyncRecord`] (presentation, inventory row).
#[derive(Debug, Clone, PartialEq)]
pub struct NestedRecord {
    pub id: String,
    pub parent_id: String,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
}

/// A locally persisted record selected for transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    pub id: String,
    pub kind: String,
    pub status: SyncStatus,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
    /// Pending sub-records keyed by nested kind name.
    pub nested: BTreeMap<String, Vec<NestedRecord>>,
}

impl SyncRecord {
    pub fn new(kind: &str, id: &str, created_at: DateTime<Utc>, payload: Value) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            status: SyncStatus::Pending,
            created_at,
            payload,
            nested: BTreeMap::new(),
        }
    }

    pub fn nested_count(&self) -> usize {
        self.nested.values().map(Vec::len).sum()
    }

    /// JSON object sent to the remote authority.
    ///
    /// The stored payload with `id` set, plus one array per nested kind.
    pub fn to_wire(&self) -> Value {
        let mut object = with_id(&self.id, &self.payload);
        for (name, items) in &self.nested {
            let encoded = items.iter().map(|n| Value::Object(with_id(&n.id, &n.payload))).collect();
            object.insert(name.clone(), Value::Array(encoded));
        }
        Value::Object(object)
    }
}

fn with_id(id: &str, payload: &Value) -> Map<String, Value> {
    let mut object = match payload {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other.clone());
            map
        }
    };
    object.insert("id".to_string(), Value::String(id.to_string()));
    object
}

/// Serialize a batch as the JSON array body of one POST.
pub fn encode_batch(records: &[SyncRecord]) -> Result<Vec<u8>> {
    let body: Vec<Value> = records.iter().map(SyncRecord::to_wire).collect();
    Ok(serde_json::to_vec(&body)?)
}

/// Convert stored epoch milliseconds back to a timestamp.
pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| ReplicationError::Internal(format!("created_at out of range: {}", ms)))
}
