//! YAML task plans.
//!
//! A plan names its tasks and wires dependencies by name; `TaskPlan::build`
//! turns it into registry tasks with generated IDs.
//!
//! ```yaml
//! tasks:
//!   - name: schema
//!     kind: database
//!     priority: 10
//!     prompt: Design the users table
//!   - name: api
//!     kind: backend
//!     prompt: Expose CRUD endpoints for users
//!     depends_on: [schema]
//! ```

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::TaskKind;
use crate::error::{ForgeError, Result};
use crate::registry::TaskRegistry;

/// Context key holding a task's plan name
pub const NAME_KEY: &str = "name";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskPlan {
    pub tasks: Vec<PlanTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanTask {
    pub name: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub priority: i32,
    pub prompt: String,
    #[serde(default)]
    pub context: HashMap<String, String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl TaskPlan {
    /// Read a plan from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let plan = Self::from_yaml(&content)?;
        tracing::debug!(path = %path.as_ref().display(), tasks = plan.tasks.len(), "Loaded plan");
        Ok(plan)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Check names and references without touching a registry.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::with_capacity(self.tasks.len());
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                return Err(ForgeError::Plan("task with empty name".into()));
            }
            if !names.insert(task.name.as_str()) {
                return Err(ForgeError::Plan(format!("duplicate task name '{}'", task.name)));
            }
        }

        for task in &self.tasks {
            for dep in &task.depends_on {
                if dep == &task.name {
                    return Err(ForgeError::Plan(format!("task '{}' depends on itself", task.name)));
                }
                if !names.contains(dep.as_str()) {
                    return Err(ForgeError::Plan(format!(
                        "task '{}' depends on unknown task '{}'",
                        task.name, dep
                    )));
                }
            }
        }
        Ok(())
    }

    /// Create the plan's tasks in `registry` and wire their dependencies.
    ///
    /// Tasks are created highest priority first; equal priorities keep file
    /// order. Returns plan name -> task ID.
    pub fn build(&self, registry: &TaskRegistry) -> Result<HashMap<String, String>> {
        self.validate()?;

        let mut ordered: Vec<&PlanTask> = self.tasks.iter().collect();
        ordered.sort_by_key(|t| Reverse(t.priority));

        let mut ids = HashMap::with_capacity(ordered.len());
        for entry in ordered {
            let task = registry.create_task(entry.kind, entry.priority, entry.prompt.clone());
            for (key, value) in &entry.context {
                registry.set_context(&task.id, key.clone(), value.clone())?;
            }
            registry.set_context(&task.id, NAME_KEY, entry.name.clone())?;
            ids.insert(entry.name.clone(), task.id);
        }

        for entry in &self.tasks {
            let task_id = &ids[&entry.name];
            for dep in &entry.depends_on {
                registry.add_dependency(task_id, &ids[dep])?;
            }
        }

        tracing::info!(tasks = ids.len(), "Plan built");
        Ok(ids)
    }
}
