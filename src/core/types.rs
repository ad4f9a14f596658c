use serde::{Deserialize, Serialize};

/// A stored record. Always a JSON object at the entity layer.
pub type Row = serde_json::Value;

/// Monotonic per-row version, bumped on every committed write.
pub type Version = u64;

/// A row as it sits in committed storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub version: Version,
    pub row: Row,
}

impl StoredRow {
    pub fn new(version: Version, row: Row) -> Self {
        Self { version, row }
    }
}
