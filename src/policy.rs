//! Per-entity transaction wrap flag and scoped overrides.
//!
//! An override captures the current value, applies a new one and puts the
//! captured value back when its guard is dropped. Nested overrides therefore
//! unwind in stack order: each one restores the value that was current when
//! it started, not the entity's original value.

use crate::connection::TransactionConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether operations on one entity run inside a transaction.
///
/// Cloning yields an independent flag with the same value, so a cloned
/// entity never shares overrides with its source.
#[derive(Debug)]
pub struct WrapPolicy {
    wrap_enabled: Arc<AtomicBool>,
}

impl WrapPolicy {
    pub fn new(wrap_enabled: bool) -> Self {
        Self {
            wrap_enabled: Arc::new(AtomicBool::new(wrap_enabled)),
        }
    }

    pub fn from_config(config: &TransactionConfig) -> Self {
        Self::new(config.wrap_by_default)
    }

    pub fn should_wrap(&self) -> bool {
        self.wrap_enabled.load(Ordering::SeqCst)
    }

    /// Sets the flag until the returned guard is dropped.
    #[must_use = "the override ends when the guard is dropped"]
    pub fn scoped(&self, wrap_enabled: bool) -> PolicyOverride {
        let previous = self.wrap_enabled.swap(wrap_enabled, Ordering::SeqCst);
        PolicyOverride {
            flag: self.wrap_enabled.clone(),
            previous,
        }
    }
}

impl Default for WrapPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Clone for WrapPolicy {
    fn clone(&self) -> Self {
        Self::new(self.should_wrap())
    }
}

/// Restores the wrap flag on drop, on every exit path.
#[derive(Debug)]
pub struct PolicyOverride {
    flag: Arc<AtomicBool>,
    previous: bool,
}

impl PolicyOverride {
    /// Value that will be restored.
    pub fn previous(&self) -> bool {
        self.previous
    }
}

impl Drop for PolicyOverride {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}
