use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::{flog_debug, Error, Result};

fn default_max_rounds() -> u32 {
    3
}

fn default_max_parallel_tasks() -> usize {
    4
}

fn default_fallback_count() -> usize {
    2
}

fn default_max_iterations() -> u32 {
    10
}

fn default_tool_timeout_secs() -> u64 {
    60
}

fn default_cancel_grace_secs() -> u64 {
    5
}

/// Engine configuration, constructed once and passed into the planner
/// and scheduler. There is no package-level mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum planning rounds before a plan is rejected for good.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Upper bound on concurrently running tasks.
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,
    /// Number of fallback workers selected alongside the primary.
    #[serde(default = "default_fallback_count")]
    pub fallback_count: usize,
    /// Worker used when no profiled worker is eligible (degraded mode).
    pub default_worker: Option<String>,
    /// Iteration cap applied when a role does not override it.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,
    /// Timeout applied to each tool invocation.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Grace period given to in-flight tool calls on cancellation.
    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_parallel_tasks: default_max_parallel_tasks(),
            fallback_count: default_fallback_count(),
            default_worker: None,
            default_max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            cancel_grace_secs: default_cancel_grace_secs(),
        }
    }
}

impl Config {
    pub fn foreman_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".foreman"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::foreman_dir()?.join("foreman.toml"))
    }

    pub fn reports_dir() -> Result<PathBuf> {
        Ok(Self::foreman_dir()?.join("reports"))
    }

    pub fn tool_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn cancel_grace(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cancel_grace_secs)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        flog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            flog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        flog_debug!(
            "Config loaded: max_rounds={}, max_parallel_tasks={}, default_worker={:?}",
            config.max_rounds,
            config.max_parallel_tasks,
            config.default_worker
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let dir = Self::foreman_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        flog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs() -> Result<()> {
        let dir = Self::foreman_dir()?;
        let reports = Self::reports_dir()?;
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        if !reports.exists() {
            fs::create_dir_all(&reports)?;
        }
        Ok(())
    }
}
