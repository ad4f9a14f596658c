// ============================================================================
// Transaction State Management
// ============================================================================
//
// Each transaction moves through Active -> Committed/Aborted.
//
// A transaction reads from the snapshot taken at BEGIN, overlaid with its
// own buffered writes. Nothing reaches committed storage before COMMIT.
//
// ============================================================================

use crate::core::{Error, Result, Row, Version};
use crate::storage::Tables;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction lifecycle
///
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A buffered write
#[derive(Debug, Clone, PartialEq)]
pub enum Pending {
    Put(Row),
    Removed,
}

/// An open transaction: its snapshot plus the writes it has buffered
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    snapshot: Tables,
    // table -> key -> pending write; ordered so commit applies deterministically
    writes: BTreeMap<String, BTreeMap<String, Pending>>,
}

impl Transaction {
    pub fn new(id: TransactionId, snapshot: Tables) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            snapshot,
            writes: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Row as seen by this transaction
    pub fn read(&self, table: &str, key: &str) -> Option<Row> {
        if let Some(pending) = self.writes.get(table).and_then(|rows| rows.get(key)) {
            return match pending {
                Pending::Put(row) => Some(row.clone()),
                Pending::Removed => None,
            };
        }
        self.snapshot
            .get(table)
            .and_then(|t| t.get(key))
            .map(|stored| stored.row.clone())
    }

    /// Rows of `table` as seen by this transaction, ordered by key
    pub fn scan(&self, table: &str) -> Vec<(String, Row)> {
        let mut rows: BTreeMap<String, Row> = self
            .snapshot
            .get(table)
            .map(|t| {
                t.iter()
                    .map(|(key, stored)| (key.clone(), stored.row.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(pending) = self.writes.get(table) {
            for (key, write) in pending {
                match write {
                    Pending::Put(row) => {
                        rows.insert(key.clone(), row.clone());
                    }
                    Pending::Removed => {
                        rows.remove(key);
                    }
                }
            }
        }

        rows.into_iter().collect()
    }

    /// Version a row had when this transaction began
    pub fn snapshot_version(&self, table: &str, key: &str) -> Option<Version> {
        self.snapshot
            .get(table)
            .and_then(|t| t.get(key))
            .map(|stored| stored.version)
    }

    /// Buffer a write
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn record(&mut self, table: &str, key: &str, write: Pending) -> Result<()> {
        if !self.state.is_active() {
            return Err(Error::TransactionError(format!(
                "Cannot write: transaction {} is {}",
                self.id, self.state
            )));
        }

        self.writes
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), write);
        Ok(())
    }

    pub fn writes(&self) -> &BTreeMap<String, BTreeMap<String, Pending>> {
        &self.writes
    }

    /// Mark transaction as committed
    pub fn commit(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(Error::TransactionError(format!(
                "Cannot commit: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Mark transaction as aborted and discard buffered writes
    pub fn rollback(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Err(Error::TransactionError(format!(
                "Cannot rollback: transaction {} is already {}",
                self.id, self.state
            )));
        }

        self.writes.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }
}
