//! Task registry for Forgeflow.
//!
//! The registry is the single owner of task state for a run. Callers build the
//! task set and dependency edges here, the executor reads snapshots and writes
//! status back through the mutation methods.
//!
//! # Example
//!
//! ```
//! use forgeflow::domain::TaskKind;
//! use forgeflow::registry::TaskRegistry;
//!
//! let registry = TaskRegistry::new();
//! let schema = registry.create_task(TaskKind::Database, 10, "Design the schema");
//! let api = registry.create_task(TaskKind::Backend, 5, "Build the API");
//! registry.add_dependency(&api.id, &schema.id).unwrap();
//!
//! let order = registry.execution_order().unwrap();
//! assert_eq!(order[0].id, schema.id);
//! ```

mod task_registry;

pub use task_registry::TaskRegistry;
