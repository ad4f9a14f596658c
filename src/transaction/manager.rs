// ============================================================================
// Transaction Manager
// ============================================================================

use super::{Pending, Transaction, TransactionId, TransactionState};
use crate::core::{Error, Result, StoredRow};
use crate::storage::{CommittedState, Tables};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Registry of open transactions and the commit/rollback protocol.
pub struct TransactionRegistry {
    transactions: Arc<Mutex<HashMap<TransactionId, Transaction>>>,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self {
            transactions: Arc::new(Mutex::new(HashMap::new())),
            committed: AtomicU64::new(0),
            rolled_back: AtomicU64::new(0),
        }
    }

    pub async fn begin(&self, snapshot: Tables) -> TransactionId {
        let transaction_id = TransactionId::new();
        let transaction = Transaction::new(transaction_id, snapshot);

        let mut transactions = self.transactions.lock().await;
        transactions.insert(transaction_id, transaction);

        transaction_id
    }

    /// Runs `f` against an open transaction.
    pub async fn with_transaction<R>(
        &self,
        txn_id: TransactionId,
        f: impl FnOnce(&mut Transaction) -> Result<R>,
    ) -> Result<R> {
        let mut transactions = self.transactions.lock().await;
        let transaction = transactions
            .get_mut(&txn_id)
            .ok_or_else(|| Error::TransactionError(format!("Transaction {} not found", txn_id)))?;

        if transaction.state() != TransactionState::Active {
            return Err(Error::TransactionError(format!(
                "Transaction {} is {}",
                txn_id,
                transaction.state()
            )));
        }

        f(transaction)
    }

    async fn take(&self, txn_id: TransactionId) -> Result<Transaction> {
        let mut transactions = self.transactions.lock().await;
        transactions
            .remove(&txn_id)
            .ok_or_else(|| Error::TransactionError(format!("Transaction {} not found", txn_id)))
    }

    /// Validates and applies the buffered writes of `txn_id`.
    ///
    /// Every written row must still carry the version it had in the
    /// transaction's snapshot. Otherwise nothing is applied, the transaction
    /// is aborted and `Error::WriteConflict` is returned.
    pub async fn commit(&self, txn_id: TransactionId, state: &mut CommittedState) -> Result<()> {
        let mut transaction = self.take(txn_id).await?;

        let conflict = transaction.writes().iter().find_map(|(table, rows)| {
            rows.keys()
                .find(|key| transaction.snapshot_version(table, key) != state.version_of(table, key))
                .map(|key| (table.clone(), key.clone()))
        });

        if let Some((table, key)) = conflict {
            transaction.rollback()?;
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
            return Err(Error::WriteConflict { table, key });
        }

        let version = state.next_version();
        for (table, rows) in transaction.writes() {
            let entry = state
                .tables
                .entry(table.clone())
                .or_insert_with(im::HashMap::new);
            for (key, write) in rows {
                match write {
                    Pending::Put(row) => {
                        entry.insert(key.clone(), StoredRow::new(version, row.clone()));
                    }
                    Pending::Removed => {
                        entry.remove(key);
                    }
                }
            }
        }

        transaction.commit()?;
        self.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub async fn rollback(&self, txn_id: TransactionId) -> Result<()> {
        let mut transaction = self.take(txn_id).await?;
        transaction.rollback()?;
        self.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Rolls back `txn_id` without waiting for the registry lock.
    ///
    /// Returns `false` when the lock is contended; an unknown id counts as
    /// done.
    pub fn try_rollback(&self, txn_id: TransactionId) -> bool {
        let Ok(mut transactions) = self.transactions.try_lock() else {
            return false;
        };
        if let Some(mut transaction) = transactions.remove(&txn_id) {
            if transaction.rollback().is_ok() {
                self.rolled_back.fetch_add(1, Ordering::SeqCst);
            }
        }
        true
    }

    pub async fn active_count(&self) -> usize {
        self.transactions.lock().await.len()
    }

    pub fn committed_count(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back_count(&self) -> u64 {
        self.rolled_back.load(Ordering::SeqCst)
    }
}
