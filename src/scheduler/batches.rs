//! Level-by-level batching of a task set.
//!
//! Batch 0 holds every task without dependencies; batch k holds the tasks whose
//! dependencies all sit in batches 0..k. Tasks admitted in one scan are placed
//! together, so no batch member depends on another member of the same batch.

use std::collections::HashSet;

use crate::domain::Task;
use crate::error::{ForgeError, Result};

/// IDs of tasks that may run concurrently. Members are unordered.
pub type Batch = Vec<String>;

/// Group `tasks` into dependency levels.
///
/// Returns `Cycle` when a scan admits nothing while tasks remain, which means
/// either a cycle or a dependency on a task outside `tasks`. Batch members keep
/// their input order; priority is not consulted.
pub fn compute_batches(tasks: &[Task]) -> Result<Vec<Batch>> {
    let mut placed: HashSet<&str> = HashSet::with_capacity(tasks.len());
    let mut seen: HashSet<&str> = HashSet::with_capacity(tasks.len());
    let mut unplaced: Vec<&Task> = tasks.iter().filter(|t| seen.insert(t.id.as_str())).collect();
    let mut batches = Vec::new();

    while !unplaced.is_empty() {
        let (ready, blocked): (Vec<&Task>, Vec<&Task>) = unplaced
            .into_iter()
            .partition(|t| t.dependencies.iter().all(|d| placed.contains(d.as_str())));

        if ready.is_empty() {
            return Err(ForgeError::Cycle(describe_blocked(&blocked, &seen)));
        }

        placed.extend(ready.iter().map(|t| t.id.as_str()));
        batches.push(ready.iter().map(|t| t.id.clone()).collect());
        unplaced = blocked;
    }

    tracing::debug!(batches = batches.len(), tasks = placed.len(), "Computed batches");
    Ok(batches)
}

/// Position of each task's batch, for callers that need to compare levels.
pub fn batch_index(batches: &[Batch], task_id: &str) -> Option<usize> {
    batches.iter().position(|b| b.iter().any(|id| id == task_id))
}

fn describe_blocked(blocked: &[&Task], known: &HashSet<&str>) -> String {
    let missing: Vec<String> = blocked
        .iter()
        .flat_map(|t| {
            t.dependencies
                .iter()
                .filter(|d| !known.contains(d.as_str()))
                .map(move |d| format!("{} -> {}", t.id, d))
        })
        .collect();

    if missing.is_empty() {
        let ids: Vec<&str> = blocked.iter().map(|t| t.id.as_str()).collect();
        format!("unresolvable tasks: {}", ids.join(", "))
    } else {
        format!("dependencies outside the task set: {}", missing.join(", "))
    }
}
