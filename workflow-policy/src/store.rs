//! Thread-safe policy storage.

use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::policy::{Policy, PolicyUpdate};

/// Shared, mutable policy singleton for one orchestrator.
#[derive(Debug, Default)]
pub struct PolicyStore {
    current: RwLock<Policy>,
}

impl PolicyStore {
    /// Creates a store seeded with `initial`.
    #[must_use]
    pub fn new(initial: Policy) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// Returns a snapshot of the current policy.
    #[must_use]
    pub fn current(&self) -> Policy {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a partial update and returns the resulting policy.
    pub fn apply(&self, update: &PolicyUpdate) -> Policy {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = *guard;
        *guard = previous.merged(update);
        if *guard != previous {
            debug!(?previous, current = ?*guard, "policy updated");
        }
        *guard
    }
}
