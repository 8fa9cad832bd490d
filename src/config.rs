use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{CommandRunnerConfig, RateLimitClassifier};
use crate::error::{ForgeError, Result};
use crate::executor::{ExecutorConfig, RetryPolicy};
use crate::scheduler::RateLimitConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub executor: ExecutorSection,
    pub rate_limit: RateLimitSection,
    pub backend: BackendSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorSection {
    pub max_workers: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub default_cooldown_secs: u64,
    pub skip_on_dependency_failure: bool,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            max_workers: 3,
            max_retries: 3,
            backoff_base_ms: 1000,
            default_cooldown_secs: 60,
            skip_on_dependency_failure: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitSection {
    pub max_requests: usize,
    pub window_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSection {
    pub program: String,
    pub args: Vec<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
    /// Extra throttling phrases on top of the built-in list
    pub rate_limit_patterns: Vec<String>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec!["--print".to_string(), "--dangerously-skip-permissions".to_string()],
            model: None,
            timeout_secs: 300,
            rate_limit_patterns: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            executor: ExecutorSection::default(),
            rate_limit: RateLimitSection::default(),
            backend: BackendSection::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, it must load
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        Ok(Self::load_first(&Self::default_locations()))
    }

    /// ~/.config/<project>/<project>.yml, then ./<project>.yml
    fn default_locations() -> Vec<PathBuf> {
        let project_name = env!("CARGO_PKG_NAME");
        let file_name = format!("{}.yml", project_name);

        let mut locations = Vec::with_capacity(2);
        if let Some(config_dir) = dirs::config_dir() {
            locations.push(config_dir.join(project_name).join(&file_name));
        }
        locations.push(PathBuf::from(file_name));
        locations
    }

    /// First existing location that loads, else defaults.
    fn load_first(locations: &[PathBuf]) -> Self {
        for path in locations.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    // File logging is configured from the result, so also tell stderr
                    eprintln!("warning: failed to load config from {}: {}", path.display(), e);
                    log::warn!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Self::default()
    }

    /// Parse and validate one YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.executor.max_workers == 0 {
            return Err(ForgeError::Config("executor.max_workers must be at least 1".into()));
        }
        if self.executor.max_retries == 0 {
            return Err(ForgeError::Config("executor.max_retries must be at least 1".into()));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ForgeError::Config("rate_limit.max_requests must be at least 1".into()));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ForgeError::Config("rate_limit.window_secs must be at least 1".into()));
        }
        if self.backend.program.trim().is_empty() {
            return Err(ForgeError::Config("backend.program must not be empty".into()));
        }
        Ok(())
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        let section = &self.executor;
        ExecutorConfig {
            max_workers: section.max_workers,
            retry: RetryPolicy::new(section.max_retries, Duration::from_millis(section.backoff_base_ms)),
            default_cooldown: Duration::from_secs(section.default_cooldown_secs),
            skip_on_dependency_failure: section.skip_on_dependency_failure,
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.rate_limit.max_requests, Duration::from_secs(self.rate_limit.window_secs))
    }

    pub fn runner_config(&self) -> CommandRunnerConfig {
        CommandRunnerConfig {
            program: self.backend.program.clone(),
            args: self.backend.args.clone(),
            model: self.backend.model.clone(),
            timeout: Duration::from_secs(self.backend.timeout_secs),
        }
    }

    /// Throttle detection with the configured extra phrases; output naming no
    /// wait falls back to the executor's default cooldown.
    pub fn classifier(&self) -> RateLimitClassifier {
        self.backend
            .rate_limit_patterns
            .iter()
            .fold(
                RateLimitClassifier::new()
                    .with_default_retry_after(Duration::from_secs(self.executor.default_cooldown_secs)),
                |classifier, pattern| classifier.with_pattern(pattern.as_str()),
            )
    }
}
