// ============================================================================
// In-memory transactional store
// ============================================================================

use super::{CommittedState, Session};
use crate::connection::{RetryPolicy, TransactionConfig};
use crate::core::Row;
use crate::transaction::TransactionRegistry;
use std::sync::Arc;
use tokio::sync::RwLock;

pub(crate) struct StoreInner {
    pub(crate) state: RwLock<CommittedState>,
    pub(crate) transactions: TransactionRegistry,
    pub(crate) retry: RetryPolicy,
}

/// Commit/rollback counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub committed: u64,
    pub rolled_back: u64,
    pub active: usize,
}

/// Tables of JSON rows with snapshot-isolated transactions.
///
/// # Examples
///
/// ```
/// use memotx::{MemoryStore, RowStore};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> memotx::Result<()> {
/// let store = MemoryStore::new();
/// let session = store.connect();
/// session.upsert("users", "1", json!({"name": "Alice"})).await?;
/// assert_eq!(store.row_count("users").await, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_retry(RetryPolicy::default())
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(CommittedState::default()),
                transactions: TransactionRegistry::new(),
                retry,
            }),
        }
    }

    pub fn from_config(config: &TransactionConfig) -> Self {
        Self::with_retry(config.retry.clone())
    }

    /// New auto-commit session
    pub fn connect(&self) -> Session {
        Session::new(self.inner.clone())
    }

    pub async fn stats(&self) -> StoreStats {
        StoreStats {
            committed: self.inner.transactions.committed_count(),
            rolled_back: self.inner.transactions.rolled_back_count(),
            active: self.inner.transactions.active_count().await,
        }
    }

    /// Committed row, bypassing any transaction
    pub async fn committed_row(&self, table: &str, key: &str) -> Option<Row> {
        let state = self.inner.state.read().await;
        state.get(table, key).map(|stored| stored.row.clone())
    }

    pub async fn row_count(&self, table: &str) -> usize {
        let state = self.inner.state.read().await;
        state.tables.get(table).map(|t| t.len()).unwrap_or(0)
    }
}
