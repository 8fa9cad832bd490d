//! ID generation utilities for Forgeflow
//!
//! Task IDs come from a counter owned by each registry, so two registries in the
//! same process hand out independent sequences.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::TaskKind;

/// Monotonic task ID source.
#[derive(Debug, Default)]
pub struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    /// Create a generator starting at 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the next task ID
    ///
    /// Format: `task-{n}-{kind}`
    /// Example: `task-3-backend`
    pub fn next_task_id(&self, kind: TaskKind) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("task-{}-{}", n, kind)
    }
}
