// ============================================================================
// Connection Contracts
// ============================================================================
//
// The two capabilities the orchestration layer consumes from a database
// handle: row-level persistence actions and the transactional primitive.
//
// ============================================================================

pub mod config;

pub use config::{RetryPolicy, TransactionConfig};

use crate::core::{Result, Row};
use std::future::Future;

/// The transactional primitive.
///
/// Implemented by connection handles. A handle is either auto-commit or bound
/// to one open transaction.
pub trait TransactionManager: Clone + Send + Sync + 'static {
    /// Returns `true` when this handle is bound to an open transaction.
    fn in_transaction(&self) -> bool;

    /// Runs `op` inside a transaction.
    ///
    /// Begins a transaction, hands `op` a handle bound to it, commits when
    /// `op` succeeds and rolls back when it fails. Transient failures are
    /// rolled back and retried until `attempts` tries have been made; any
    /// other failure, or the last transient one, is returned unchanged.
    ///
    /// A handle that is already inside a transaction joins it: `op` runs once
    /// on a clone of the same handle and the enclosing transaction decides
    /// whether its writes are kept.
    fn run_in_transaction<T, F, Fut>(
        &self,
        attempts: usize,
        op: F,
    ) -> impl Future<Output = Result<T>> + Send
    where
        T: Send,
        F: FnMut(Self) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send;
}

/// Row persistence actions used by entities.
pub trait RowStore: Clone + Send + Sync + 'static {
    fn fetch(&self, table: &str, key: &str) -> impl Future<Output = Result<Option<Row>>> + Send;

    /// Fails with `Error::ConstraintViolation` when `key` already exists.
    fn insert(&self, table: &str, key: &str, row: Row) -> impl Future<Output = Result<()>> + Send;

    fn upsert(&self, table: &str, key: &str, row: Row) -> impl Future<Output = Result<()>> + Send;

    /// Returns whether a row was removed.
    fn remove(&self, table: &str, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// All rows of `table` ordered by key.
    fn scan(&self, table: &str) -> impl Future<Output = Result<Vec<(String, Row)>>> + Send;
}

/// A handle entities can persist through.
pub trait Connection: RowStore + TransactionManager {}

impl<C: RowStore + TransactionManager> Connection for C {}
