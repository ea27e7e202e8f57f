// crates/story-gate-core/src/runtime/snapshot.rs
// ============================================================================
// Module: Story Gate Configuration Snapshots
// Description: Reload-and-swap cell for immutable configuration snapshots.
// Purpose: Keep in-flight scans and cost calculations on a consistent snapshot.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Readers clone the current `Arc` once at the start of an operation and use
//! it to completion. Reloads replace the `Arc`; snapshots already handed out
//! are unaffected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::RwLock;

// ============================================================================
// SECTION: Snapshot Cell
// ============================================================================

/// Atomically swappable immutable snapshot.
#[derive(Debug)]
pub struct SnapshotCell<T> {
    /// Current snapshot.
    current: RwLock<Arc<T>>,
}

impl<T> SnapshotCell<T> {
    /// Creates a cell holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<T> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces the snapshot and returns the previous one.
    pub fn swap(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        match self.current.write() {
            Ok(mut guard) => std::mem::replace(&mut *guard, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        }
    }
}
