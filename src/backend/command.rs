//! Runner that shells out to a code-generation CLI.
//!
//! Each attempt spawns the configured program with the task's persona as a
//! system prompt and the task prompt as the final argument. Combined output is
//! run through the `RateLimitClassifier`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::classify::RateLimitClassifier;
use super::runner::{RunOutcome, RunnerError, TaskRunner};
use crate::domain::Task;

/// Configuration for a command runner
#[derive(Debug, Clone)]
pub struct CommandRunnerConfig {
    /// Program to execute
    pub program: String,
    /// Arguments placed before the generated ones
    pub args: Vec<String>,
    /// Passed as `--model` when set
    pub model: Option<String>,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for CommandRunnerConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec!["--print".to_string(), "--dangerously-skip-permissions".to_string()],
            model: None,
            timeout: Duration::from_secs(300),
        }
    }
}

impl CommandRunnerConfig {
    /// Create a config for the given program with no extra arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            ..Default::default()
        }
    }

    /// Append a fixed argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `TaskRunner` backed by an external process
pub struct CommandRunner {
    config: CommandRunnerConfig,
    classifier: RateLimitClassifier,
}

impl CommandRunner {
    pub fn new(config: CommandRunnerConfig) -> Self {
        Self {
            config,
            classifier: RateLimitClassifier::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: RateLimitClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Full argument list for one attempt of `task`.
    pub fn build_args(&self, task: &Task) -> Vec<String> {
        let mut args = self.config.args.clone();

        if let Some(model) = &self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        args.push("--append-system-prompt".to_string());
        args.push(format!("You are a {}. {}", task.kind.role(), task.kind.system_prompt()));
        args.push(task.prompt.clone());
        args
    }

    async fn execute(&self, task: &Task) -> Result<std::process::Output, RunnerError> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.build_args(task))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;

        match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RunnerError::Timeout(self.config.timeout)),
        }
    }
}

#[async_trait]
impl TaskRunner for CommandRunner {
    async fn run(&self, task: &Task) -> Result<RunOutcome, RunnerError> {
        let output = self.execute(task).await?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            text.push('\n');
            text.push_str(stderr.trim_end());
        }

        let classification = self.classifier.classify(&text);
        if classification.rate_limited {
            return Ok(RunOutcome::RateLimited {
                output: text,
                retry_after: classification.retry_after,
            });
        }

        if !output.status.success() {
            return Err(RunnerError::Exit {
                code: output.status.code(),
                output: text,
            });
        }

        Ok(RunOutcome::Success(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskKind;

    fn task(prompt: &str) -> Task {
        Task::new("task-1-backend", TaskKind::Backend, 0, prompt)
    }

    #[test]
    fn test_default_config() {
        let config = CommandRunnerConfig::default();
        assert_eq!(config.program, "claude");
        assert!(config.args.contains(&"--print".to_string()));
        assert_eq!(config.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_build_args_includes_persona_and_prompt() {
        let runner = CommandRunner::new(CommandRunnerConfig::new("claude").arg("--print").model("opus"));
        let args = runner.build_args(&task("Build the API"));

        assert_eq!(args[0], "--print");
        assert_eq!(&args[1..3], &["--model".to_string(), "opus".to_string()]);
        assert_eq!(args[3], "--append-system-prompt");
        assert!(args[4].starts_with("You are a backend-developer. You are an expert backend developer"));
        assert_eq!(args.last().map(String::as_str), Some("Build the API"));
    }

    // `sh -c` receives the generated args as $0, $1, $2; $2 is the prompt.
    #[cfg(unix)]
    fn shell(script: &str) -> CommandRunner {
        CommandRunner::new(CommandRunnerConfig::new("sh").arg("-c").arg(script))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_success() {
        let outcome = shell("echo \"$2\"").run(&task("hello world")).await.unwrap();
        assert_eq!(outcome, RunOutcome::Success("hello world\n".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_detects_rate_limit() {
        let outcome = shell("echo 'Too many requests, retry after 30 seconds' >&2; exit 1")
            .run(&task("anything"))
            .await
            .unwrap();
        match outcome {
            RunOutcome::RateLimited { output, retry_after } => {
                assert!(output.contains("Too many requests"));
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_nonzero_exit() {
        let err = shell("echo broken; exit 3").run(&task("anything")).await.unwrap_err();
        match err {
            RunnerError::Exit { code, output } => {
                assert_eq!(code, Some(3));
                assert!(output.contains("broken"));
            }
            other => panic!("expected exit error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_timeout() {
        let runner = CommandRunner::new(
            CommandRunnerConfig::new("sh")
                .arg("-c")
                .arg("sleep 5")
                .timeout(Duration::from_millis(50)),
        );
        let err = runner.run(&task("anything")).await.unwrap_err();
        assert!(matches!(err, RunnerError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let runner = CommandRunner::new(CommandRunnerConfig::new("forgeflow-no-such-binary"));
        let err = runner.run(&task("anything")).await.unwrap_err();
        assert!(matches!(err, RunnerError::Spawn(_)));
        assert!(!err.is_retryable());
    }
}
