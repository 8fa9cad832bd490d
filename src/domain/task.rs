//! Task record and related types
//!
//! A Task is one unit of work sent to the generation backend. Tasks live inside
//! the `TaskRegistry`; everything else works on snapshots.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work with a prompt, a kind, and dependencies on other tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    //=== Identity ===
    /// Unique identifier ("task-3-backend")
    pub id: String,

    /// Selects the backend persona; opaque to scheduling
    pub kind: TaskKind,

    /// Informational; only affects creation order upstream
    pub priority: i32,

    //=== Payload ===
    /// Instruction sent to the backend
    pub prompt: String,

    /// Free-form key/value context
    pub context: HashMap<String, String>,

    /// IDs this task depends on (unique, never self)
    pub dependencies: Vec<String>,

    //=== Runtime State ===
    pub status: TaskStatus,

    /// Attempts made against the backend
    pub retry_count: u32,

    /// Backend output, present only on success
    pub result: Option<String>,

    /// Failure cause, present only on failure or skip
    pub failure: Option<String>,

    //=== Timestamps ===
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with no dependencies.
    pub fn new(id: impl Into<String>, kind: TaskKind, priority: i32, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            priority,
            prompt: prompt.into(),
            context: HashMap::new(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            retry_count: 0,
            result: None,
            failure: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Check whether this task depends directly on `id`.
    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.iter().any(|d| d == id)
    }

    /// Human-friendly label: the plan name from context if set, else the ID.
    pub fn label(&self) -> &str {
        self.context.get("name").map(String::as_str).unwrap_or(&self.id)
    }
}

/// Category of work, used to pick a backend persona
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Frontend,
    Backend,
    Database,
    Testing,
    Documentation,
    DevOps,
}

impl TaskKind {
    /// All kinds, in declaration order.
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Frontend,
        TaskKind::Backend,
        TaskKind::Database,
        TaskKind::Testing,
        TaskKind::Documentation,
        TaskKind::DevOps,
    ];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Frontend => "frontend",
            TaskKind::Backend => "backend",
            TaskKind::Database => "database",
            TaskKind::Testing => "testing",
            TaskKind::Documentation => "documentation",
            TaskKind::DevOps => "devops",
        }
    }

    /// Persona role handed to the backend.
    pub fn role(&self) -> &'static str {
        match self {
            TaskKind::Frontend => "frontend-developer",
            TaskKind::Backend => "backend-developer",
            TaskKind::Database => "database-architect",
            TaskKind::Testing => "qa-engineer",
            TaskKind::Documentation => "technical-writer",
            TaskKind::DevOps => "devops-engineer",
        }
    }

    /// Persona system prompt handed to the backend.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            TaskKind::Frontend => "You are an expert frontend developer specializing in modern web frameworks.",
            TaskKind::Backend => {
                "You are an expert backend developer specializing in API design and server architecture."
            }
            TaskKind::Database => "You are a database architect specializing in schema design and optimization.",
            TaskKind::Testing => "You are a QA engineer specializing in test automation and quality assurance.",
            TaskKind::Documentation => {
                "You are a technical writer specializing in clear and comprehensive documentation."
            }
            TaskKind::DevOps => "You are a DevOps engineer specializing in CI/CD and infrastructure automation.",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown task kind: {}", s))
    }
}

/// Task status state machine.
///
/// `Pending -> InProgress -> {Completed | Failed}` and `Pending -> Skipped`.
/// Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to start
    Pending,
    /// Holding a worker slot
    InProgress,
    /// Backend returned a result
    Completed,
    /// Retry budget exhausted
    Failed,
    /// Never attempted because a dependency did not succeed
    Skipped,
}

impl TaskStatus {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped)
    }

    /// Check whether moving to `next` is allowed.
    ///
    /// Re-entering the same non-terminal status is a no-op and allowed.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (a, b) if *a == b => !a.is_terminal(),
            (Pending, InProgress | Skipped | Failed) => true,
            (InProgress, Completed | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new("task-1-backend", TaskKind::Backend, 5, "Build the API");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.priority, 5);
        assert!(task.dependencies.is_empty());
        assert!(task.context.is_empty());
        assert!(task.result.is_none());
        assert!(task.failure.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_task_label_prefers_plan_name() {
        let mut task = Task::new("task-1-backend", TaskKind::Backend, 0, "x");
        assert_eq!(task.label(), "task-1-backend");
        task.context.insert("name".into(), "api".into());
        assert_eq!(task.label(), "api");
    }

    #[test]
    fn test_task_kind_as_str_and_parse() {
        for kind in TaskKind::ALL {
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
        }
        assert_eq!("DevOps".parse::<TaskKind>().unwrap(), TaskKind::DevOps);
        assert!("mobile".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_task_kind_serialization() {
        let json = serde_json::to_string(&TaskKind::DevOps).unwrap();
        assert_eq!(json, "\"devops\"");
    }

    #[test]
    fn test_task_kind_personas() {
        assert_eq!(TaskKind::Database.role(), "database-architect");
        assert_eq!(TaskKind::Testing.role(), "qa-engineer");
        for kind in TaskKind::ALL {
            assert!(kind.system_prompt().starts_with("You are"));
        }
    }

    #[test]
    fn test_task_status_as_str() {
        assert_eq!(TaskStatus::Pending.as_str(), "pending");
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
        assert_eq!(TaskStatus::Skipped.as_str(), "skipped");
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn test_task_status_is_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_task_status_transitions() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Skipped));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(InProgress));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Skipped));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Completed));
        assert!(!Skipped.can_transition_to(InProgress));
    }
}
