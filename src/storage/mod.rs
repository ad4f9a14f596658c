pub mod memory;
pub mod session;

pub use memory::{MemoryStore, StoreStats};
pub use session::Session;

use crate::core::{StoredRow, Version};

/// One table: key -> committed row. Persistent map, so cloning is O(1).
pub type Table = im::HashMap<String, StoredRow>;

/// All tables by name.
pub type Tables = im::HashMap<String, Table>;

/// Committed storage plus the version clock.
#[derive(Debug, Clone, Default)]
pub struct CommittedState {
    pub tables: Tables,
    version: Version,
}

impl CommittedState {
    pub fn version_of(&self, table: &str, key: &str) -> Option<Version> {
        self.tables
            .get(table)
            .and_then(|t| t.get(key))
            .map(|stored| stored.version)
    }

    pub fn get(&self, table: &str, key: &str) -> Option<&StoredRow> {
        self.tables.get(table).and_then(|t| t.get(key))
    }

    pub fn next_version(&mut self) -> Version {
        self.version += 1;
        self.version
    }
}
