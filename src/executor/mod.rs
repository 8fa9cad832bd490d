//! Parallel execution of a task graph.
//!
//! `ParallelExecutor` takes tasks from a `TaskRegistry`, groups them into
//! dependency batches and runs each batch under a worker budget. Every attempt
//! passes the shared `RateLimiter` first; failures are retried per
//! `RetryPolicy` and recorded back into the registry.

mod parallel;
mod retry;

pub use parallel::{ExecutorConfig, ParallelExecutor};
pub use retry::RetryPolicy;
