use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;

// Kinds of records the API keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Ward,
    Incident,
    Alert,
}

impl EntityKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ward => "ward",
            Self::Incident => "incident",
            Self::Alert => "alert",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    // For stores backed by something that can go away (a database, a
    // remote service). MemoryStore never returns it.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence seam used by the handlers.
///
/// Records are JSON objects. `create` assigns the `id` field; `update`
/// shallow-merges the patch's fields into the stored object and never
/// changes `id`. Missing records are `Ok(None)`, not errors.
pub trait DataStore: Send + Sync {
    fn list(&self, kind: EntityKind) -> Result<Vec<Value>, StoreError>;
    fn get(&self, kind: EntityKind, id: u64) -> Result<Option<Value>, StoreError>;
    fn create(&self, kind: EntityKind, payload: Value) -> Result<Value, StoreError>;
    fn update(&self, kind: EntityKind, id: u64, patch: Value) -> Result<Option<Value>, StoreError>;
}

// One table per entity kind, ids handed out from an atomic sequence
struct Table {
    rows: DashMap<u64, Value>,
    next_id: AtomicU64,
}

impl Table {
    fn new() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

pub struct MemoryStore {
    wards: Table,
    incidents: Table,
    alerts: Table,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            wards: Table::new(),
            incidents: Table::new(),
            alerts: Table::new(),
        }
    }

    fn table(&self, kind: EntityKind) -> &Table {
        match kind {
            EntityKind::Ward => &self.wards,
            EntityKind::Incident => &self.incidents,
            EntityKind::Alert => &self.alerts,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStore for MemoryStore {
    fn list(&self, kind: EntityKind) -> Result<Vec<Value>, StoreError> {
        let mut rows: Vec<(u64, Value)> = self
            .table(kind)
            .rows
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        Ok(rows.into_iter().map(|(_, v)| v).collect())
    }

    fn get(&self, kind: EntityKind, id: u64) -> Result<Option<Value>, StoreError> {
        Ok(self.table(kind).rows.get(&id).map(|e| e.value().clone()))
    }

    fn create(&self, kind: EntityKind, payload: Value) -> Result<Value, StoreError> {
        let Value::Object(mut record) = payload else {
            return Err(StoreError::InvalidRecord(format!("{kind} must be a JSON object")));
        };

        let table = self.table(kind);
        let id = table.next_id.fetch_add(1, Ordering::Relaxed);
        record.insert("id".to_string(), Value::from(id));

        let record = Value::Object(record);
        table.rows.insert(id, record.clone());
        Ok(record)
    }

    fn update(&self, kind: EntityKind, id: u64, patch: Value) -> Result<Option<Value>, StoreError> {
        let Value::Object(fields) = patch else {
            return Err(StoreError::InvalidRecord(format!("{kind} patch must be a JSON object")));
        };

        let Some(mut row) = self.table(kind).rows.get_mut(&id) else {
            return Ok(None);
        };
        let Value::Object(record) = row.value_mut() else {
            return Err(StoreError::InvalidRecord(format!("stored {kind} {id} is not an object")));
        };

        for (key, value) in fields {
            if key != "id" {
                record.insert(key, value);
            }
        }
        Ok(Some(row.value().clone()))
    }
}
