//! Core runner trait and outcome types

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::Task;

/// Stateless backend capability - each call is an independent attempt
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run one attempt of `task` against the backend.
    async fn run(&self, task: &Task) -> Result<RunOutcome, RunnerError>;
}

/// What one backend attempt produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Backend produced output
    Success(String),

    /// Backend throttled us; `retry_after` if the output said how long
    RateLimited {
        output: String,
        retry_after: Option<Duration>,
    },
}

impl RunOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        RunOutcome::Success(output.into())
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        RunOutcome::RateLimited {
            output: String::new(),
            retry_after,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RunOutcome::RateLimited { .. })
    }
}

/// Errors that can occur during a backend attempt
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Failed to spawn backend: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Backend exited with code {code:?}: {output}")]
    Exit { code: Option<i32>, output: String },

    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend failed: {0}")]
    Failed(String),
}

impl RunnerError {
    pub fn failed(message: impl Into<String>) -> Self {
        RunnerError::Failed(message.into())
    }

    /// A spawn failure means the backend binary is missing or unusable, so
    /// retrying cannot help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RunnerError::Spawn(_))
    }
}
