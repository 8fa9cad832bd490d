//! Scheduling primitives for task execution.
//!
//! This module provides:
//! - **Batching**: groups a task set into dependency levels that can each run
//!   concurrently.
//! - **Rate limiting**: sliding-window pacing plus a global cooldown that any
//!   worker can trigger when the backend throttles us.
//!
//! # Example
//!
//! ```
//! use forgeflow::domain::{Task, TaskKind};
//! use forgeflow::scheduler::compute_batches;
//!
//! let init = Task::new("init", TaskKind::DevOps, 0, "scaffold");
//! let mut api = Task::new("api", TaskKind::Backend, 0, "build api");
//! api.dependencies.push("init".into());
//!
//! let batches = compute_batches(&[init, api]).unwrap();
//! assert_eq!(batches, vec![vec!["init".to_string()], vec!["api".to_string()]]);
//! ```

mod batches;
mod rate_limit;

pub use batches::{Batch, batch_index, compute_batches};
pub use rate_limit::{RateLimitConfig, RateLimiter};
