//! TaskRegistry implementation: flat task arena with ID-list edges.
//!
//! Edges are kept twice: every task carries its dependency list (readiness
//! checks) and the registry keeps a forward adjacency list from each task to
//! its dependents (topological counting). Both sit behind one `RwLock`, so a
//! registry can be shared between workers through an `Arc`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::domain::{Task, TaskKind, TaskStatus};
use crate::error::{ForgeError, Result};
use crate::id::IdGenerator;

#[derive(Debug, Default)]
struct RegistryState {
    tasks: HashMap<String, Task>,
    /// Creation order, for stable snapshots
    order: Vec<String>,
    /// task -> tasks that depend on it
    dependents: HashMap<String, Vec<String>>,
}

impl RegistryState {
    fn task_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| ForgeError::NotFound(id.to_string()))
    }

    fn snapshot<F>(&self, mut keep: F) -> Vec<Task>
    where
        F: FnMut(&Task) -> bool,
    {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| keep(t))
            .cloned()
            .collect()
    }

    /// Depth-first search: can `target` be reached from `start` by following
    /// dependency edges?
    fn reaches(&self, start: &str, target: &str) -> bool {
        let mut stack = vec![start];
        let mut visited = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(task) = self.tasks.get(current) {
                stack.extend(task.dependencies.iter().map(String::as_str));
            }
        }

        false
    }
}

/// Owns every task of a run, its dependency edges and its mutable status.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    ids: IdGenerator,
    state: RwLock<RegistryState>,
}

impl TaskRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a pending task and return a snapshot of it.
    pub fn create_task(&self, kind: TaskKind, priority: i32, prompt: impl Into<String>) -> Task {
        let id = self.ids.next_task_id(kind);
        let task = Task::new(id.clone(), kind, priority, prompt);

        let mut state = self.write();
        state.order.push(id.clone());
        state.tasks.insert(id.clone(), task.clone());

        tracing::debug!(task_id = %id, kind = %kind, priority, "Task created");
        task
    }

    /// Record that `task_id` depends on `depends_on_id`.
    ///
    /// Fails without touching the graph if either ID is unknown or if the edge
    /// would close a cycle. Adding an edge that already exists is a no-op.
    pub fn add_dependency(&self, task_id: &str, depends_on_id: &str) -> Result<()> {
        let mut state = self.write();

        if !state.tasks.contains_key(task_id) {
            return Err(ForgeError::NotFound(task_id.to_string()));
        }
        if !state.tasks.contains_key(depends_on_id) {
            return Err(ForgeError::NotFound(depends_on_id.to_string()));
        }

        if state.reaches(depends_on_id, task_id) {
            return Err(ForgeError::Cycle(format!(
                "{} -> {} would close a cycle",
                task_id, depends_on_id
            )));
        }

        let task = state.task_mut(task_id)?;
        if task.depends_on(depends_on_id) {
            return Ok(());
        }
        task.dependencies.push(depends_on_id.to_string());

        state
            .dependents
            .entry(depends_on_id.to_string())
            .or_default()
            .push(task_id.to_string());

        tracing::debug!(task_id, depends_on = depends_on_id, "Dependency added");
        Ok(())
    }

    /// Move a task to `status`; stamps the completion time on `Completed`.
    pub fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<()> {
        let mut state = self.write();
        let task = state.task_mut(task_id)?;

        if !task.status.can_transition_to(status) {
            return Err(ForgeError::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.status,
                to: status,
            });
        }

        task.status = status;
        if status == TaskStatus::Completed {
            task.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Store the backend output for a task.
    pub fn set_result(&self, task_id: &str, result: impl Into<String>) -> Result<()> {
        let mut state = self.write();
        state.task_mut(task_id)?.result = Some(result.into());
        Ok(())
    }

    /// Record a failure cause and force the task to `Failed`.
    pub fn set_failure(&self, task_id: &str, cause: impl Into<String>) -> Result<()> {
        let mut state = self.write();
        let task = state.task_mut(task_id)?;

        if !task.status.can_transition_to(TaskStatus::Failed) {
            return Err(ForgeError::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.status,
                to: TaskStatus::Failed,
            });
        }

        task.failure = Some(cause.into());
        task.status = TaskStatus::Failed;
        Ok(())
    }

    /// Move a pending task to `Skipped` with the given reason.
    pub fn mark_skipped(&self, task_id: &str, reason: impl Into<String>) -> Result<()> {
        let mut state = self.write();
        let task = state.task_mut(task_id)?;

        if task.status != TaskStatus::Pending {
            return Err(ForgeError::InvalidTransition {
                task_id: task_id.to_string(),
                from: task.status,
                to: TaskStatus::Skipped,
            });
        }

        task.failure = Some(reason.into());
        task.status = TaskStatus::Skipped;
        Ok(())
    }

    /// Count one backend attempt; returns the new total.
    pub fn record_attempt(&self, task_id: &str) -> Result<u32> {
        let mut state = self.write();
        let task = state.task_mut(task_id)?;
        task.retry_count += 1;
        Ok(task.retry_count)
    }

    /// Set a context key on a task.
    pub fn set_context(&self, task_id: &str, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let mut state = self.write();
        state.task_mut(task_id)?.context.insert(key.into(), value.into());
        Ok(())
    }

    /// Snapshot of a single task.
    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.read().tasks.get(task_id).cloned()
    }

    /// Check whether a task exists.
    pub fn contains(&self, task_id: &str) -> bool {
        self.read().tasks.contains_key(task_id)
    }

    /// Snapshots of every task, in creation order.
    pub fn all_tasks(&self) -> Vec<Task> {
        self.read().snapshot(|_| true)
    }

    /// Snapshots of tasks with the given status.
    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<Task> {
        self.read().snapshot(|t| t.status == status)
    }

    /// Snapshots of tasks of the given kind.
    pub fn tasks_by_kind(&self, kind: TaskKind) -> Vec<Task> {
        self.read().snapshot(|t| t.kind == kind)
    }

    /// Pending tasks whose dependencies have all completed.
    pub fn ready_tasks(&self) -> Vec<Task> {
        let state = self.read();
        state.snapshot(|t| {
            t.status == TaskStatus::Pending
                && t.dependencies.iter().all(|dep| {
                    state
                        .tasks
                        .get(dep)
                        .map(|d| d.status == TaskStatus::Completed)
                        .unwrap_or(false)
                })
        })
    }

    /// IDs of tasks that depend directly on `task_id`.
    pub fn dependents_of(&self, task_id: &str) -> Vec<String> {
        self.read().dependents.get(task_id).cloned().unwrap_or_default()
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.read().tasks.len()
    }

    /// True when no task has been created.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full topological order using Kahn's algorithm.
    ///
    /// Seeds are taken in creation order. Returns `Cycle` if any task is left
    /// out of the ordering.
    pub fn execution_order(&self) -> Result<Vec<Task>> {
        let state = self.read();

        let mut in_degree: HashMap<&str, usize> = state
            .tasks
            .values()
            .map(|t| (t.id.as_str(), t.dependencies.len()))
            .collect();

        let mut queue: VecDeque<&str> = state
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        let mut ordered = Vec::with_capacity(state.tasks.len());
        while let Some(current) = queue.pop_front() {
            if let Some(task) = state.tasks.get(current) {
                ordered.push(task.clone());
            }

            for dependent in state.dependents.get(current).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }

        // Unreachable while edges only enter through `add_dependency`
        if ordered.len() != state.tasks.len() {
            let stuck: Vec<&str> = state
                .order
                .iter()
                .map(String::as_str)
                .filter(|id| in_degree.get(id).copied().unwrap_or(0) > 0)
                .collect();
            return Err(ForgeError::Cycle(format!("unresolvable tasks: {}", stuck.join(", "))));
        }

        Ok(ordered)
    }

    /// Insert an edge without the cycle check.
    #[cfg(test)]
    fn force_dependency(&self, task_id: &str, depends_on_id: &str) {
        let mut state = self.write();
        if let Ok(task) = state.task_mut(task_id) {
            task.dependencies.push(depends_on_id.to_string());
        }
        state
            .dependents
            .entry(depends_on_id.to_string())
            .or_default()
            .push(task_id.to_string());
    }
}
