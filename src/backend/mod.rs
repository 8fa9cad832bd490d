//! Backends that turn a task prompt into generated output.
//!
//! The executor only talks to `TaskRunner`. `CommandRunner` is the production
//! implementation; tests plug in scripted runners.

mod classify;
mod command;
mod runner;

pub use classify::{Classification, DEFAULT_PATTERNS, DEFAULT_RETRY_AFTER, RateLimitClassifier};
pub use command::{CommandRunner, CommandRunnerConfig};
pub use runner::{RunOutcome, RunnerError, TaskRunner};
