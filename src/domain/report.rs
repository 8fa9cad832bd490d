//! Execution report aggregation.
//!
//! The report is a derived snapshot: it can be rebuilt at any time from task
//! statuses, and the executor refreshes it after every batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::{Task, TaskStatus};
use crate::error::Result;

/// Per-run tally handed to reporting collaborators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionReport {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub skipped_tasks: usize,
    /// Batches launched so far
    pub batches: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock run time, set by `finish`
    pub duration_ms: u64,
    /// Task snapshots from the latest refresh
    pub tasks: Vec<Task>,
}

impl ExecutionReport {
    /// Start a report for a run over `tasks`.
    pub fn begin(tasks: Vec<Task>) -> Self {
        let mut report = Self {
            total_tasks: tasks.len(),
            completed_tasks: 0,
            failed_tasks: 0,
            skipped_tasks: 0,
            batches: 0,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
            tasks: Vec::new(),
        };
        report.refresh(tasks);
        report
    }

    /// Recount from fresh task snapshots.
    pub fn refresh(&mut self, tasks: Vec<Task>) {
        self.total_tasks = tasks.len();
        self.completed_tasks = count(&tasks, TaskStatus::Completed);
        self.failed_tasks = count(&tasks, TaskStatus::Failed);
        self.skipped_tasks = count(&tasks, TaskStatus::Skipped);
        self.tasks = tasks;
    }

    /// Stamp end time and duration.
    pub fn finish(&mut self) {
        let now = Utc::now();
        self.duration_ms = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.finished_at = Some(now);
    }

    /// Tasks not yet in a terminal state.
    pub fn unfinished_tasks(&self) -> usize {
        self.total_tasks - self.completed_tasks - self.failed_tasks - self.skipped_tasks
    }

    /// True when every task completed.
    pub fn is_success(&self) -> bool {
        self.completed_tasks == self.total_tasks
    }

    /// Pretty-printed JSON for report files.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Look up a task snapshot by ID.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

fn count(tasks: &[Task], status: TaskStatus) -> usize {
    tasks.iter().filter(|t| t.status == status).count()
}
