//! Forgeflow - dependency-aware parallel execution of AI code-generation tasks
//!
//! Tasks live in a `TaskRegistry` with their dependency edges. The scheduler
//! groups them into batches, and the `ParallelExecutor` runs each batch under
//! a worker budget, pacing every backend call through a shared `RateLimiter`.

pub mod backend;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod id;
pub mod plan;
pub mod registry;
pub mod scheduler;
pub mod wait;

pub use error::{ForgeError, Result};
