use super::memory::StoreInner;
use crate::connection::{RowStore, TransactionManager};
use crate::core::{Error, Result, Row, StoredRow};
use crate::transaction::{Pending, TransactionId};
use log::warn;
use std::future::Future;
use std::sync::Arc;

/// A handle on a [`MemoryStore`](super::MemoryStore).
///
/// Without a transaction every write commits on its own. A session returned
/// by [`Session::bound_to`] buffers its writes in that transaction instead.
#[derive(Clone)]
pub struct Session {
    store: Arc<StoreInner>,
    transaction_id: Option<TransactionId>,
}

impl Session {
    pub(crate) fn new(store: Arc<StoreInner>) -> Self {
        Self {
            store,
            transaction_id: None,
        }
    }

    fn bound_to(&self, transaction_id: TransactionId) -> Self {
        Self {
            store: self.store.clone(),
            transaction_id: Some(transaction_id),
        }
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    async fn begin_transaction(&self) -> TransactionId {
        let snapshot = self.store.state.read().await.tables.clone();
        self.store.transactions.begin(snapshot).await
    }

    async fn commit_transaction(&self, transaction_id: TransactionId) -> Result<()> {
        let mut state = self.store.state.write().await;
        self.store.transactions.commit(transaction_id, &mut state).await
    }

    async fn rollback_transaction(&self, transaction_id: TransactionId) -> Result<()> {
        self.store.transactions.rollback(transaction_id).await
    }

    /// One begin/run/commit round. A failed commit has already aborted the
    /// transaction, so only a failed `op` needs an explicit rollback.
    ///
    /// If this future is dropped before the round finishes, the open
    /// transaction is rolled back by `RollbackOnDrop`.
    async fn attempt<T, F, Fut>(&self, op: &mut F) -> Result<T>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let transaction_id = self.begin_transaction().await;
        let mut guard = RollbackOnDrop::new(self.store.clone(), transaction_id);

        let outcome = match op(self.bound_to(transaction_id)).await {
            Ok(value) => self
                .commit_transaction(transaction_id)
                .await
                .map(|()| value),
            Err(err) => {
                if let Err(rollback_err) = self.rollback_transaction(transaction_id).await {
                    warn!("rollback of {} failed: {}", transaction_id, rollback_err);
                }
                Err(err)
            }
        };

        guard.disarm();
        outcome
    }

    async fn write(&self, table: &str, key: &str, write: Pending) -> Result<()> {
        match self.transaction_id {
            Some(id) => {
                self.store
                    .transactions
                    .with_transaction(id, |txn| txn.record(table, key, write))
                    .await
            }
            None => {
                let mut state = self.store.state.write().await;
                let version = state.next_version();
                let rows = state
                    .tables
                    .entry(table.to_string())
                    .or_insert_with(im::HashMap::new);
                match write {
                    Pending::Put(row) => {
                        rows.insert(key.to_string(), StoredRow::new(version, row));
                    }
                    Pending::Removed => {
                        rows.remove(key);
                    }
                }
                Ok(())
            }
        }
    }
}

/// Rolls back an abandoned transaction when dropped while still armed.
struct RollbackOnDrop {
    store: Arc<StoreInner>,
    transaction_id: Option<TransactionId>,
}

impl RollbackOnDrop {
    fn new(store: Arc<StoreInner>, transaction_id: TransactionId) -> Self {
        Self {
            store,
            transaction_id: Some(transaction_id),
        }
    }

    fn disarm(&mut self) {
        self.transaction_id = None;
    }
}

impl Drop for RollbackOnDrop {
    fn drop(&mut self) {
        let Some(transaction_id) = self.transaction_id.take() else {
            return;
        };
        if self.store.transactions.try_rollback(transaction_id) {
            warn!("rolled back abandoned transaction {}", transaction_id);
            return;
        }

        // registry busy: finish on the runtime
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                handle.spawn(async move {
                    if let Err(err) = store.transactions.rollback(transaction_id).await {
                        warn!("rollback of abandoned {} failed: {}", transaction_id, err);
                    }
                });
            }
            Err(_) => warn!(
                "abandoned transaction {} left open: no runtime to roll it back",
                transaction_id
            ),
        }
    }
}

impl TransactionManager for Session {
    fn in_transaction(&self) -> bool {
        self.transaction_id.is_some()
    }

    async fn run_in_transaction<T, F, Fut>(&self, attempts: usize, mut op: F) -> Result<T>
    where
        T: Send,
        F: FnMut(Self) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        if self.in_transaction() {
            return op(self.clone()).await;
        }

        let max_attempts = attempts.max(1);
        let mut attempt = 1usize;
        loop {
            match self.attempt(&mut op).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= max_attempts || !err.is_transient() {
                        return Err(err);
                    }

                    let backoff = self.store.retry.backoff(attempt);
                    warn!(
                        "transaction retry on conflict (attempt {} of {}): {} (backoff={}ms)",
                        attempt,
                        max_attempts,
                        err,
                        backoff.as_millis()
                    );
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl RowStore for Session {
    async fn fetch(&self, table: &str, key: &str) -> Result<Option<Row>> {
        match self.transaction_id {
            Some(id) => {
                self.store
                    .transactions
                    .with_transaction(id, |txn| Ok(txn.read(table, key)))
                    .await
            }
            None => {
                let state = self.store.state.read().await;
                Ok(state.get(table, key).map(|stored| stored.row.clone()))
            }
        }
    }

    async fn insert(&self, table: &str, key: &str, row: Row) -> Result<()> {
        if self.fetch(table, key).await?.is_some() {
            return Err(Error::ConstraintViolation(format!(
                "duplicate key '{}' in '{}'",
                key, table
            )));
        }
        self.write(table, key, Pending::Put(row)).await
    }

    async fn upsert(&self, table: &str, key: &str, row: Row) -> Result<()> {
        self.write(table, key, Pending::Put(row)).await
    }

    async fn remove(&self, table: &str, key: &str) -> Result<bool> {
        if self.fetch(table, key).await?.is_none() {
            return Ok(false);
        }
        self.write(table, key, Pending::Removed).await?;
        Ok(true)
    }

    async fn scan(&self, table: &str) -> Result<Vec<(String, Row)>> {
        match self.transaction_id {
            Some(id) => {
                self.store
                    .transactions
                    .with_transaction(id, |txn| Ok(txn.scan(table)))
                    .await
            }
            None => {
                let state = self.store.state.read().await;
                let mut rows: Vec<(String, Row)> = state
                    .tables
                    .get(table)
                    .map(|t| {
                        t.iter()
                            .map(|(key, stored)| (key.clone(), stored.row.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                rows.sort_by(|a, b| a.0.cmp(&b.0));
                Ok(rows)
            }
        }
    }
}
