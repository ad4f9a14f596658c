// ============================================================================
// Models
// ============================================================================
//
// A model is plain serde data bound to a table. `Entity` wraps one model
// instance with its key, timestamps, wrap policy and connection, and runs
// every write through the transaction runner.
//
// ============================================================================

pub mod entity;
mod record;

pub use entity::Entity;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub trait Model: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    /// Table the model's rows live in
    const TABLE: &'static str;

    /// `delete` stamps `deleted_at` instead of removing the row
    const SOFT_DELETES: bool = false;

    /// Default wrap policy for the model type.
    ///
    /// Used by class-level entry points and as the initial flag of every new
    /// entity, without constructing one.
    fn wrap_by_default() -> bool {
        true
    }
}
