use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use forgeflow::ForgeError;
use forgeflow::backend::CommandRunner;
use forgeflow::config::Config;
use forgeflow::domain::{ExecutionReport, Task, TaskStatus};
use forgeflow::executor::ParallelExecutor;
use forgeflow::plan::TaskPlan;
use forgeflow::registry::TaskRegistry;
use forgeflow::scheduler::{RateLimiter, compute_batches};
use tokio_util::sync::CancellationToken;

mod cli;

use cli::Cli;
use cli::commands::Commands;

fn setup_logging(default_level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("forgeflow")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("forgeflow.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn load_plan(path: &Path) -> Result<(TaskPlan, Arc<TaskRegistry>)> {
    let plan = TaskPlan::load(path).context(format!("Failed to load plan from {}", path.display()))?;
    let registry = Arc::new(TaskRegistry::new());
    plan.build(&registry).context("Failed to build task graph")?;
    Ok((plan, registry))
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }
    info!("Using plan: {}", cli.command.plan_path().display());

    match &cli.command {
        Commands::Run { plan, workers, report } => handle_run_command(plan, *workers, report.as_deref(), config).await,
        Commands::Batches { plan } => handle_batches_command(plan),
        Commands::Check { plan } => handle_check_command(plan, cli.is_verbose()),
    }
}

async fn handle_run_command(plan_path: &Path, workers: Option<usize>, report_path: Option<&Path>, config: &Config) -> Result<()> {
    let (_, registry) = load_plan(plan_path)?;

    let mut executor_config = config.executor_config();
    if let Some(workers) = workers {
        executor_config.max_workers = workers;
    }

    let runner = Arc::new(CommandRunner::new(config.runner_config()).with_classifier(config.classifier()));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit_config()));
    let executor = ParallelExecutor::new(registry.clone(), runner, limiter, executor_config);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling: waiting for in-flight work to stop...".yellow());
            trigger.cancel();
        }
    });

    println!(
        "{} {} tasks with {} workers",
        "Running:".green(),
        registry.len(),
        executor.config().max_workers
    );

    match executor.execute_all(&cancel).await {
        Ok(report) => {
            print_summary(&report);
            if let Some(path) = report_path {
                write_report(&report, path)?;
            }
            if report.is_success() {
                Ok(())
            } else {
                Err(eyre::eyre!(
                    "{} of {} tasks did not complete ({} failed, {} skipped, {} unfinished)",
                    report.total_tasks - report.completed_tasks,
                    report.total_tasks,
                    report.failed_tasks,
                    report.skipped_tasks,
                    report.unfinished_tasks()
                ))
            }
        }
        Err(ForgeError::Cancelled) => {
            let mut report = ExecutionReport::begin(registry.all_tasks());
            report.finish();
            print_summary(&report);
            if let Some(path) = report_path {
                write_report(&report, path)?;
            }
            Err(eyre::eyre!(
                "Execution cancelled with {} task(s) unfinished",
                report.unfinished_tasks()
            ))
        }
        Err(e) => Err(e).context("Execution failed"),
    }
}

fn handle_batches_command(plan_path: &Path) -> Result<()> {
    let (_, registry) = load_plan(plan_path)?;
    let tasks = registry.all_tasks();
    let batches = compute_batches(&tasks).context("Failed to compute batches")?;

    for (index, batch) in batches.iter().enumerate() {
        let labels: Vec<String> = batch
            .iter()
            .filter_map(|id| registry.get_task(id))
            .map(|t| format!("{} ({})", t.label(), t.kind))
            .collect();
        println!("{} {}", format!("Batch {}:", index).cyan(), labels.join(", "));
    }
    Ok(())
}

fn handle_check_command(plan_path: &Path, verbose: bool) -> Result<()> {
    let (plan, registry) = load_plan(plan_path)?;
    let order = registry.execution_order().context("Plan has a dependency cycle")?;

    println!("{} {} tasks, no cycles", "OK:".green(), plan.tasks.len());
    if verbose {
        for task in &order {
            println!("  {} [{}] {}", task.label(), task.kind, task.id.dimmed());
        }
    }
    Ok(())
}

fn status_label(task: &Task) -> ColoredString {
    match task.status {
        TaskStatus::Completed => "completed".green(),
        TaskStatus::Failed => "failed".red(),
        TaskStatus::Skipped => "skipped".yellow(),
        TaskStatus::InProgress => "interrupted".magenta(),
        TaskStatus::Pending => "not started".dimmed(),
    }
}

fn print_summary(report: &ExecutionReport) {
    println!();
    for task in &report.tasks {
        println!("  {:<12} {} ({} attempt(s))", status_label(task), task.label(), task.retry_count);
        if let Some(cause) = &task.failure {
            println!("               {}", cause.dimmed());
        }
    }
    println!(
        "\n{} {} completed, {} failed, {} skipped in {:.1}s",
        "Summary:".bold(),
        report.completed_tasks.to_string().green(),
        report.failed_tasks.to_string().red(),
        report.skipped_tasks.to_string().yellow(),
        report.duration_ms as f64 / 1000.0
    );
}

fn write_report(report: &ExecutionReport, path: &Path) -> Result<()> {
    let json = report.to_json().context("Failed to serialize report")?;
    fs::write(path, json).context(format!("Failed to write report to {}", path.display()))?;
    println!("{} {}", "Report written to".green(), path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging
    let level = if cli.is_verbose() {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    setup_logging(level).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
