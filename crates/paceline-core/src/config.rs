use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::retry::RetryPolicy;

/// Retry parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per scoring call (including the first).
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 7 }
    }
}

/// Scoring backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Scoring endpoint URL (http or https).
    pub endpoint: String,
    /// Optional bearer token sent as an Authorization header.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/score".to_string(),
            auth_token: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Global configuration loaded from `~/.config/paceline/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacelineConfig {
    /// Cost ceiling for any trailing 60-second window. 0 disables runs.
    pub budget_limit: u64,
    /// Worker pool ceiling. The budget window is the real admission
    /// gate; the pool only needs to be large enough to never itself
    /// become the bottleneck, so a few hundred is plenty.
    pub max_workers: usize,
    /// Largest single-task cost accepted into a batch. Anything above
    /// this is reported as skipped instead of submitted, since a task
    /// costing more than the whole window limit could never be admitted.
    pub max_task_cost: u64,
    /// Where the batch report is written (default: ./paceline.report.json).
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    /// Paths skipped during file intake.
    #[serde(default)]
    pub ignore: Vec<PathBuf>,
    /// Optional retry parameters; built-in defaults if missing.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Scoring backend settings.
    #[serde(default)]
    pub service: ServiceConfig,
}

impl Default for PacelineConfig {
    fn default() -> Self {
        Self {
            budget_limit: 200_000,
            max_workers: 512,
            max_task_cost: 100_000,
            report_path: None,
            ignore: Vec::new(),
            retry: None,
            service: ServiceConfig::default(),
        }
    }
}

impl PacelineConfig {
    /// Retry policy from the optional config section.
    pub fn retry_policy(&self) -> RetryPolicy {
        let max_attempts = self
            .retry
            .as_ref()
            .map(|r| r.max_attempts)
            .unwrap_or_else(|| RetryConfig::default().max_attempts);
        RetryPolicy::new(max_attempts)
    }

    /// Reject configurations the scheduler cannot honor. A zero budget
    /// limit is allowed here; runs treat it as a no-op.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_workers >= 1, "max_workers must be at least 1");
        if self.budget_limit > 0 {
            anyhow::ensure!(
                self.max_task_cost <= self.budget_limit,
                "max_task_cost ({}) exceeds budget_limit ({}); such tasks could never be admitted",
                self.max_task_cost,
                self.budget_limit
            );
        }
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("paceline")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PacelineConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PacelineConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: PacelineConfig = toml::from_str(&data)?;
    Ok(cfg)
}
