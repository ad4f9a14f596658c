//! Fluent transaction configuration.
//!
//! ```
//! use memotx::{MemoryStore, RowStore, Transaction};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> memotx::Result<()> {
//! let store = MemoryStore::new();
//! let session = store.connect();
//!
//! let id = Transaction::start()
//!     .attempts(3)
//!     .on_success(|id: &String| println!("created {id}"))
//!     .run(&session, |tx| async move {
//!         tx.insert("orders", "o-1", json!({"total": 10})).await?;
//!         tx.insert("order_items", "o-1/1", json!({"sku": "A"})).await?;
//!         Ok("o-1".to_string())
//!     })
//!     .await?;
//!
//! assert_eq!(id, "o-1");
//! # Ok(())
//! # }
//! ```

use crate::connection::{TransactionConfig, TransactionManager};
use crate::core::{Error, Result};
use crate::runner::{Hooks, TransactionRunner};
use std::future::Future;

/// Accumulates attempts and hooks, then runs one unit of work.
///
/// `run` takes the builder by value: one builder drives exactly one call.
pub struct Transaction<'h, T> {
    attempts: usize,
    hooks: Hooks<'h, T>,
}

impl<'h, T> Transaction<'h, T> {
    pub fn start() -> Self {
        Self {
            attempts: 1,
            hooks: Hooks::none(),
        }
    }

    pub fn from_config(config: &TransactionConfig) -> Self {
        Self::start().attempts(config.default_attempts)
    }

    /// Total tries on transient failure. Values below 1 run once.
    pub fn attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn on_success(mut self, hook: impl FnOnce(&T) + Send + 'h) -> Self {
        self.hooks = self.hooks.on_success(hook);
        self
    }

    pub fn on_failure(mut self, hook: impl FnOnce(&Error) + Send + 'h) -> Self {
        self.hooks = self.hooks.on_failure(hook);
        self
    }

    /// Always transactional, whatever any entity's wrap policy says.
    pub async fn run<C, F, Fut>(self, conn: &C, op: F) -> Result<T>
    where
        C: TransactionManager,
        T: Send,
        F: FnMut(C) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        TransactionRunner::run(conn, op, true, self.attempts, self.hooks).await
    }
}

impl<T> Default for Transaction<'_, T> {
    fn default() -> Self {
        Self::start()
    }
}
