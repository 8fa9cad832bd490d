//! Batch-by-batch execution under a fixed worker budget.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::retry::RetryPolicy;
use crate::backend::{RunOutcome, TaskRunner};
use crate::domain::{ExecutionReport, Task, TaskStatus};
use crate::error::{ForgeError, Result};
use crate::registry::TaskRegistry;
use crate::scheduler::{RateLimiter, compute_batches};
use crate::wait::{ensure_active, sleep_or_cancel};

/// Executor tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Tasks allowed in flight at once
    pub max_workers: usize,
    pub retry: RetryPolicy,
    /// Cooldown applied when a rate-limited response names no duration
    pub default_cooldown: Duration,
    /// Move dependents of failed or skipped tasks to Skipped instead of running them
    pub skip_on_dependency_failure: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            retry: RetryPolicy::default(),
            default_cooldown: Duration::from_secs(60),
            skip_on_dependency_failure: true,
        }
    }
}

/// Runs registry tasks level by level, at most `max_workers` at a time.
pub struct ParallelExecutor {
    registry: Arc<TaskRegistry>,
    runner: Arc<dyn TaskRunner>,
    limiter: Arc<RateLimiter>,
    config: ExecutorConfig,
    active: AtomicUsize,
}

/// Counts a task as active for as long as it holds a worker permit.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ParallelExecutor {
    pub fn new(
        registry: Arc<TaskRegistry>,
        runner: Arc<dyn TaskRunner>,
        limiter: Arc<RateLimiter>,
        config: ExecutorConfig,
    ) -> Self {
        let config = ExecutorConfig {
            max_workers: config.max_workers.max(1),
            ..config
        };
        Self {
            registry,
            runner,
            limiter,
            config,
            active: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Tasks currently holding a worker permit.
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Execute every task in the registry.
    pub async fn execute_all(&self, cancel: &CancellationToken) -> Result<ExecutionReport> {
        let tasks = self.registry.all_tasks();
        self.execute_tasks(&tasks, cancel).await
    }

    /// Execute `tasks` batch by batch and report their final state.
    ///
    /// Only graph errors and cancellation are returned as `Err`; a task that
    /// runs out of attempts is recorded as Failed and the run carries on.
    /// Each batch is fully terminal before the next one launches.
    pub async fn execute_tasks(&self, tasks: &[Task], cancel: &CancellationToken) -> Result<ExecutionReport> {
        let batches = compute_batches(tasks)?;
        let ids: Vec<String> = batches.iter().flatten().cloned().collect();
        let mut report = ExecutionReport::begin(self.snapshot(&ids));

        tracing::info!(
            tasks = ids.len(),
            batches = batches.len(),
            max_workers = self.config.max_workers,
            "Starting execution"
        );

        for (index, batch) in batches.iter().enumerate() {
            ensure_active(cancel)?;

            let runnable = self.prepare_batch(batch)?;
            tracing::info!(batch = index, size = batch.len(), runnable = runnable.len(), "Launching batch");

            self.execute_batch(&runnable, cancel).await?;

            report.batches += 1;
            report.refresh(self.snapshot(&ids));
            tracing::info!(
                batch = index,
                completed = report.completed_tasks,
                failed = report.failed_tasks,
                skipped = report.skipped_tasks,
                "Batch finished"
            );
        }

        report.finish();
        tracing::info!(
            completed = report.completed_tasks,
            failed = report.failed_tasks,
            skipped = report.skipped_tasks,
            duration_ms = report.duration_ms,
            "Execution finished"
        );
        Ok(report)
    }

    /// Run one batch to completion under the worker budget.
    ///
    /// Every member runs independently; a failed sibling does not stop the
    /// others. Returns the first run-fatal error after all members settle.
    pub async fn execute_batch(&self, batch: &[String], cancel: &CancellationToken) -> Result<()> {
        let semaphore = Semaphore::new(self.config.max_workers);
        let semaphore = &semaphore;

        let mut running: FuturesUnordered<_> = batch
            .iter()
            .map(|task_id| async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ForgeError::Cancelled),
                    permit = semaphore.acquire() => permit.map_err(|_| ForgeError::Cancelled)?,
                };
                let _active = ActiveGuard::enter(&self.active);

                self.registry.update_status(task_id, TaskStatus::InProgress)?;
                self.run_task(task_id, cancel).await
            })
            .collect();

        let mut first_error: Option<ForgeError> = None;
        while let Some(result) = running.next().await {
            if let Err(err) = result {
                if !matches!(err, ForgeError::Cancelled) {
                    tracing::error!(error = %err, "Task aborted");
                }
                // Run-fatal errors outrank task-level ones
                if first_error
                    .as_ref()
                    .is_none_or(|kept| err.is_run_fatal() && !kept.is_run_fatal())
                {
                    first_error = Some(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Attempt loop for one InProgress task; leaves it Completed or Failed.
    async fn run_task(&self, task_id: &str, cancel: &CancellationToken) -> Result<()> {
        let policy = &self.config.retry;
        let mut attempts = 0;
        let mut last_error = String::new();

        for attempt in 0..policy.max_attempts {
            ensure_active(cancel)?;
            self.limiter.admit(cancel).await?;

            attempts = self.registry.record_attempt(task_id)?;
            let task = self
                .registry
                .get_task(task_id)
                .ok_or_else(|| ForgeError::NotFound(task_id.to_string()))?;

            tracing::debug!(task_id, attempt = attempts, kind = %task.kind, "Dispatching attempt");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ForgeError::Cancelled),
                outcome = self.runner.run(&task) => outcome,
            };

            match outcome {
                Ok(RunOutcome::Success(output)) => {
                    self.registry.set_result(task_id, output)?;
                    self.registry.update_status(task_id, TaskStatus::Completed)?;
                    tracing::info!(task_id, attempts, "Task completed");
                    return Ok(());
                }
                Ok(RunOutcome::RateLimited { retry_after, .. }) => {
                    let cooldown = retry_after.unwrap_or(self.config.default_cooldown);
                    self.limiter.signal_cooldown(cooldown);
                    last_error = ForgeError::RateLimited { retry_after: cooldown }.to_string();

                    if policy.has_next(attempt) {
                        sleep_or_cancel(cooldown, cancel).await?;
                    }
                }
                Err(err) => {
                    tracing::warn!(task_id, attempt = attempts, error = %err, "Attempt failed");
                    last_error = err.to_string();

                    if !err.is_retryable() {
                        break;
                    }
                    if policy.has_next(attempt) {
                        let delay = policy.backoff(attempt);
                        tracing::debug!(task_id, delay_ms = delay.as_millis() as u64, "Backing off");
                        sleep_or_cancel(delay, cancel).await?;
                    }
                }
            }
        }

        let cause = ForgeError::TaskExecution {
            task_id: task_id.to_string(),
            attempts,
            message: last_error,
        };
        tracing::error!(task_id, attempts, error = %cause, "Task failed");
        self.registry.set_failure(task_id, cause.to_string())
    }

    /// Pending members that should run; others are skipped or left alone.
    fn prepare_batch(&self, batch: &[String]) -> Result<Vec<String>> {
        let mut runnable = Vec::with_capacity(batch.len());

        for task_id in batch {
            let task = self
                .registry
                .get_task(task_id)
                .ok_or_else(|| ForgeError::NotFound(task_id.clone()))?;

            if task.status != TaskStatus::Pending {
                tracing::debug!(task_id = %task.id, status = %task.status, "Task not pending, leaving as is");
                continue;
            }

            if self.config.skip_on_dependency_failure
                && let Some((dep, status)) = self.unusable_dependency(&task)
            {
                let reason = format!("dependency {} {}", dep, status);
                tracing::warn!(task_id = %task.id, %reason, "Skipping task");
                self.registry.mark_skipped(&task.id, reason)?;
                continue;
            }

            runnable.push(task.id);
        }

        Ok(runnable)
    }

    fn unusable_dependency(&self, task: &Task) -> Option<(String, TaskStatus)> {
        task.dependencies.iter().find_map(|dep| {
            let status = self.registry.get_task(dep)?.status;
            matches!(status, TaskStatus::Failed | TaskStatus::Skipped).then(|| (dep.clone(), status))
        })
    }

    fn snapshot(&self, ids: &[String]) -> Vec<Task> {
        ids.iter().filter_map(|id| self.registry.get_task(id)).collect()
    }
}
