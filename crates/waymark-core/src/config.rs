use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, WaymarkError};

/// Top-level Waymark configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaymarkConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Completion tracker polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Interval between backend status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Hard ceiling for a single tracked task. Values past what the clock
    /// can represent behave as "never".
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// How long a task may sit in `Starting` while the backend reports idle
    /// before it counts as already finished. 0 disables this, so a task only
    /// completes after the backend has reported it active.
    #[serde(default = "default_start_grace_ms")]
    pub start_grace_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            task_timeout_secs: default_task_timeout_secs(),
            start_grace_ms: default_start_grace_ms(),
        }
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn start_grace(&self) -> Option<Duration> {
        (self.start_grace_ms > 0).then(|| Duration::from_millis(self.start_grace_ms))
    }
}

/// Execution status display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Minimum time `is_executing` keeps reporting true after a run ends.
    #[serde(default = "default_hold_secs")]
    pub hold_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            hold_secs: default_hold_secs(),
        }
    }
}

impl StatusConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_secs(self.hold_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on nodes executed in one run (0 = unlimited).
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

/// Behaviour of the built-in simulated backend used by `waymark run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Polls a tracked process reports active before going idle.
    #[serde(default = "default_active_polls")]
    pub active_polls: u32,
    /// Polls a path-like process keeps a queued path after going idle.
    #[serde(default = "default_queued_polls")]
    pub queued_polls: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            active_polls: default_active_polls(),
            queued_polls: default_queued_polls(),
        }
    }
}

fn default_poll_interval_ms() -> u64 { 100 }
fn default_task_timeout_secs() -> u64 { 300 }
fn default_start_grace_ms() -> u64 { 2000 }
fn default_hold_secs() -> u64 { 3 }
fn default_max_steps() -> usize { 10_000 }
fn default_active_polls() -> u32 { 5 }
fn default_queued_polls() -> u32 { 2 }

impl WaymarkConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WaymarkError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| WaymarkError::Config(e.to_string()))
    }

    /// Load from `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
