//! End-to-end execution tests
//!
//! Plans are loaded from YAML files, built into a registry and executed
//! against a scripted in-memory backend under paused tokio time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use forgeflow::backend::{RunOutcome, RunnerError, TaskRunner};
use forgeflow::config::Config;
use forgeflow::domain::{Task, TaskStatus};
use forgeflow::error::{ForgeError, Result};
use forgeflow::executor::{ExecutorConfig, ParallelExecutor};
use forgeflow::plan::TaskPlan;
use forgeflow::registry::TaskRegistry;
use forgeflow::scheduler::{RateLimitConfig, RateLimiter, compute_batches};
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const PROJECT_PLAN: &str = r#"
tasks:
  - name: init
    kind: devops
    prompt: init
  - name: db
    kind: database
    prompt: db
    depends_on: [init]
  - name: api
    kind: backend
    prompt: api
    depends_on: [db]
  - name: ui
    kind: frontend
    prompt: ui
    depends_on: [init]
  - name: test
    kind: testing
    prompt: test
    depends_on: [api, ui]
"#;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Start(String),
    End(String),
}

/// Backend that takes `delay` per call, logs start/end events by prompt, and
/// replays scripted outcomes before falling back to success.
struct TimelineRunner {
    delay: Duration,
    events: Mutex<Vec<Event>>,
    scripts: Mutex<HashMap<String, Vec<std::result::Result<RunOutcome, RunnerError>>>>,
}

impl TimelineRunner {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            events: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
        }
    }

    fn always(self, prompt: &str, attempts: usize, outcome: impl Fn() -> std::result::Result<RunOutcome, RunnerError>) -> Self {
        let steps = (0..attempts).map(|_| outcome()).collect();
        self.scripts.lock().unwrap().insert(prompt.to_string(), steps);
        self
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn position(&self, event: Event) -> usize {
        self.events()
            .iter()
            .position(|e| *e == event)
            .unwrap_or_else(|| panic!("missing event {:?}", event))
    }
}

#[async_trait]
impl TaskRunner for TimelineRunner {
    async fn run(&self, task: &Task) -> std::result::Result<RunOutcome, RunnerError> {
        self.events.lock().unwrap().push(Event::Start(task.prompt.clone()));
        tokio::time::sleep(self.delay).await;
        self.events.lock().unwrap().push(Event::End(task.prompt.clone()));

        let scripted = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.get_mut(&task.prompt).and_then(|steps| (!steps.is_empty()).then(|| steps.remove(0)))
        };
        scripted.unwrap_or_else(|| Ok(RunOutcome::success(format!("generated {}", task.prompt))))
    }
}

fn write_plan(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("plan.yml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn build(yaml: &str) -> Result<(Arc<TaskRegistry>, HashMap<String, String>)> {
    let dir = TempDir::new()?;
    let plan = TaskPlan::load(write_plan(&dir, yaml))?;
    let registry = Arc::new(TaskRegistry::new());
    let ids = plan.build(&registry)?;
    Ok((registry, ids))
}

fn executor(registry: Arc<TaskRegistry>, runner: Arc<TimelineRunner>, max_workers: usize) -> ParallelExecutor {
    ParallelExecutor::new(
        registry,
        runner,
        Arc::new(RateLimiter::new(RateLimitConfig::new(100, Duration::from_secs(60)))),
        ExecutorConfig {
            max_workers,
            ..Default::default()
        },
    )
}

#[test]
fn test_project_plan_batches() -> Result<()> {
    let (registry, ids) = build(PROJECT_PLAN)?;
    let batches = compute_batches(&registry.all_tasks())?;

    let named: Vec<Vec<String>> = batches
        .iter()
        .map(|batch| {
            let mut names: Vec<String> = batch
                .iter()
                .map(|id| registry.get_task(id).unwrap().label().to_string())
                .collect();
            names.sort();
            names
        })
        .collect();

    assert_eq!(named, vec![vec!["init"], vec!["db", "ui"], vec!["api"], vec!["test"]]);
    assert_eq!(registry.execution_order()?.first().map(|t| t.id.clone()), Some(ids["init"].clone()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_project_plan_runs_level_by_level() -> Result<()> {
    let (registry, _) = build(PROJECT_PLAN)?;
    let runner = Arc::new(TimelineRunner::new(Duration::from_millis(500)));

    let report = executor(registry.clone(), runner.clone(), 2)
        .execute_all(&CancellationToken::new())
        .await?;

    assert!(report.is_success());
    assert_eq!(report.completed_tasks, 5);
    assert_eq!(report.batches, 4);
    assert!(report.finished_at.is_some());

    let start = |name: &str| runner.position(Event::Start(name.into()));
    let end = |name: &str| runner.position(Event::End(name.into()));

    // db and ui overlap
    assert!(start("ui") < end("db"));
    assert!(start("db") < end("ui"));

    // every dependency ends before its dependent starts
    assert!(end("init") < start("db"));
    assert!(end("init") < start("ui"));
    assert!(end("db") < start("api"));
    assert!(end("ui") < start("api"));
    assert!(end("api") < start("test"));
    assert!(end("ui") < start("test"));

    for task in registry.all_tasks() {
        assert_eq!(task.result.as_deref(), Some(format!("generated {}", task.prompt).as_str()));
        assert_eq!(task.retry_count, 1);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failure_skips_downstream_only() -> Result<()> {
    let (registry, ids) = build(PROJECT_PLAN)?;
    let runner = Arc::new(
        TimelineRunner::new(Duration::from_millis(10)).always("db", 3, || Err(RunnerError::failed("schema error"))),
    );

    let report = executor(registry.clone(), runner.clone(), 2)
        .execute_all(&CancellationToken::new())
        .await?;

    let status = |name: &str| registry.get_task(&ids[name]).unwrap().status;
    assert_eq!(status("init"), TaskStatus::Completed);
    assert_eq!(status("ui"), TaskStatus::Completed);
    assert_eq!(status("db"), TaskStatus::Failed);
    assert_eq!(status("api"), TaskStatus::Skipped);
    assert_eq!(status("test"), TaskStatus::Skipped);

    assert_eq!(report.completed_tasks, 2);
    assert_eq!(report.failed_tasks, 1);
    assert_eq!(report.skipped_tasks, 2);
    assert!(!report.is_success());

    let db = report.task(&ids["db"]).unwrap();
    assert_eq!(db.retry_count, 3);
    assert!(db.failure.as_deref().unwrap().contains("schema error"));
    assert!(!runner.events().contains(&Event::Start("api".into())));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_task_fails_after_budget() -> Result<()> {
    let (registry, ids) = build(PROJECT_PLAN)?;
    let runner = Arc::new(
        TimelineRunner::new(Duration::ZERO).always("init", 3, || Ok(RunOutcome::rate_limited(Some(Duration::from_secs(2))))),
    );

    let started = Instant::now();
    let report = executor(registry.clone(), runner, 2)
        .execute_all(&CancellationToken::new())
        .await?;

    let init = report.task(&ids["init"]).unwrap();
    assert_eq!(init.status, TaskStatus::Failed);
    assert!(init.failure.as_deref().unwrap().contains("Rate limited"));
    assert_eq!(report.skipped_tasks, 4);
    // two cooldown waits between three attempts
    assert!(started.elapsed() >= Duration::from_secs(4));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_returns_promptly() -> Result<()> {
    let (registry, ids) = build(PROJECT_PLAN)?;
    let runner = Arc::new(TimelineRunner::new(Duration::from_secs(600)));
    let exec = executor(registry.clone(), runner, 1);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = exec.execute_all(&cancel).await.unwrap_err();
    assert!(matches!(err, ForgeError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(60));

    assert_eq!(registry.get_task(&ids["init"]).unwrap().status, TaskStatus::InProgress);
    assert!(registry.tasks_with_status(TaskStatus::Completed).is_empty());
    assert_eq!(registry.tasks_with_status(TaskStatus::Pending).len(), 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rate_limiter_window_scenario() -> Result<()> {
    let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_secs(1)));
    let cancel = CancellationToken::new();

    let first = Instant::now();
    limiter.admit(&cancel).await?;
    limiter.admit(&cancel).await?;
    limiter.admit(&cancel).await?;

    assert!(first.elapsed() >= Duration::from_secs(1));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_config_file_drives_executor() -> Result<()> {
    let dir = TempDir::new()?;
    let config_path = dir.path().join("forgeflow.yml");
    std::fs::write(
        &config_path,
        "executor:\n  max_workers: 1\n  max_retries: 2\n  backoff_base_ms: 100\nrate_limit:\n  max_requests: 50\n  window_secs: 1\n",
    )?;
    let config = Config::load(Some(&config_path))?;

    let (registry, ids) = build(PROJECT_PLAN)?;
    let runner = Arc::new(
        TimelineRunner::new(Duration::ZERO).always("ui", 2, || Err(RunnerError::Timeout(Duration::from_secs(1)))),
    );
    let exec = ParallelExecutor::new(
        registry.clone(),
        runner,
        Arc::new(RateLimiter::new(config.rate_limit_config())),
        config.executor_config(),
    );
    assert_eq!(exec.config().max_workers, 1);

    let report = exec.execute_all(&CancellationToken::new()).await?;
    let ui = report.task(&ids["ui"]).unwrap();
    assert_eq!(ui.status, TaskStatus::Failed);
    assert_eq!(ui.retry_count, 2);
    assert_eq!(report.completed_tasks, 3);
    assert_eq!(report.skipped_tasks, 1);
    Ok(())
}

#[test]
fn test_report_serializes_to_json() -> Result<()> {
    let (registry, _) = build(PROJECT_PLAN)?;
    let report = forgeflow::domain::ExecutionReport::begin(registry.all_tasks());
    let json = serde_json::to_value(&report)?;

    assert_eq!(json["total_tasks"], 5);
    assert_eq!(json["tasks"][0]["status"], "pending");
    Ok(())
}
