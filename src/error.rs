//! Error types for Forgeflow
//!
//! Centralized error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

use crate::domain::TaskStatus;

/// All error types that can occur in Forgeflow
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Unknown task or dependency ID
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Dependency graph is not a DAG
    #[error("Dependency cycle detected: {0}")]
    Cycle(String),

    /// Status change out of a terminal state or otherwise disallowed
    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Backend asked us to back off
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Backend call failed after the retry budget ran out
    #[error("Task {task_id} failed after {attempts} attempt(s): {message}")]
    TaskExecution {
        task_id: String,
        attempts: u32,
        message: String,
    },

    /// Caller cancelled the run
    #[error("Execution cancelled")]
    Cancelled,

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// Invalid task plan
    #[error("Plan error: {0}")]
    Plan(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForgeError {
    /// True for conditions that abort a whole run rather than a single task.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, ForgeError::Cycle(_) | ForgeError::Cancelled | ForgeError::NotFound(_))
    }
}

/// Result type alias for Forgeflow operations
pub type Result<T> = std::result::Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = ForgeError::NotFound("task-1-backend".to_string());
        assert_eq!(err.to_string(), "Task not found: task-1-backend");
    }

    #[test]
    fn test_cycle_error() {
        let err = ForgeError::Cycle("a -> b -> a".to_string());
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = ForgeError::InvalidTransition {
            task_id: "task-1-database".to_string(),
            from: TaskStatus::Completed,
            to: TaskStatus::InProgress,
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition for task task-1-database: completed -> in_progress"
        );
    }

    #[test]
    fn test_rate_limited_error_mentions_rate_limit() {
        let err = ForgeError::RateLimited {
            retry_after: Duration::from_secs(30),
        };
        assert!(err.to_string().starts_with("Rate limited"));
    }

    #[test]
    fn test_task_execution_error() {
        let err = ForgeError::TaskExecution {
            task_id: "task-2-frontend".to_string(),
            attempts: 3,
            message: "exit code 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Task task-2-frontend failed after 3 attempt(s): exit code 1"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ForgeError = io_err.into();
        assert!(matches!(err, ForgeError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<Vec<u32>>("{not: a list}").unwrap_err();
        let err: ForgeError = yaml_err.into();
        assert!(matches!(err, ForgeError::Yaml(_)));
    }

    #[test]
    fn test_run_fatal_classification() {
        assert!(ForgeError::Cancelled.is_run_fatal());
        assert!(ForgeError::Cycle("x".into()).is_run_fatal());
        assert!(
            !ForgeError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .is_run_fatal()
        );
        assert!(!ForgeError::Config("bad".into()).is_run_fatal());
    }
}
