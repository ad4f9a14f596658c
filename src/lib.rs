// ============================================================================
// memotx Library
// ============================================================================
//
// Transaction wrapping for entity writes: a per-entity wrap policy with
// scoped overrides, a runner that executes units of work directly or through
// a connection's transactional primitive, and a fluent builder for retries
// and outcome hooks.
//
// ============================================================================

pub mod builder;
pub mod connection;
pub mod core;
pub mod model;
pub mod policy;
pub mod runner;
pub mod storage;
pub mod transaction;

pub use builder::Transaction;
pub use connection::{Connection, RetryPolicy, RowStore, TransactionConfig, TransactionManager};
pub use crate::core::{Error, Result, Row};
pub use model::{Entity, Model};
pub use policy::{PolicyOverride, WrapPolicy};
pub use runner::{Hooks, TransactionRunner, transaction, transaction_with};
pub use storage::{MemoryStore, Session, StoreStats};

pub use futures::future::BoxFuture;
