//! Domain types for Forgeflow
//!
//! This module contains the core domain types:
//! - Task: a unit of work with kind, prompt, dependencies and status
//! - TaskKind: backend persona selector
//! - TaskStatus: the task state machine
//! - ExecutionReport: per-run tally derived from task statuses

pub mod report;
pub mod task;

pub use report::ExecutionReport;
pub use task::{Task, TaskKind, TaskStatus};
