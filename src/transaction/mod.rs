// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Snapshot isolation with first-committer-wins write conflict detection.
//
// ============================================================================

pub mod manager;
pub mod state;

pub use manager::TransactionRegistry;
pub use state::{Pending, Transaction, TransactionId, TransactionState};
