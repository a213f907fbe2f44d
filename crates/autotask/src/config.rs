//! Engine tunables.
//!
//! Every field has a default; `from_env` overlays `AUTOTASK_*` variables and
//! `from_json` reads a partial JSON document on top of the defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::errors::AutomationError;

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_millis(1_500);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overall timeout for a task that never calls `set_timeout`
    pub task_timeout_ms: u64,
    /// Locator timeout for actions built without an explicit one
    pub action_timeout_ms: u64,
    pub locator_poll_interval_ms: u64,
    /// How long a timed-out task's worker may keep running after cancellation
    pub cancel_grace_ms: u64,
    pub launch: LaunchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            task_timeout_ms: DEFAULT_TASK_TIMEOUT.as_millis() as u64,
            action_timeout_ms: DEFAULT_ACTION_TIMEOUT.as_millis() as u64,
            locator_poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            cancel_grace_ms: 1_000,
            launch: LaunchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Delay before the first launch attempt
    pub settle_delay_ms: u64,
    /// Delay between failed attempts
    pub retry_backoff_ms: u64,
    pub foreground_poll_interval_ms: u64,
    pub default_wait_ms: u64,
    pub default_attempts: u32,
    /// Minimum delay after dispatch when the caller asked not to wait
    pub no_wait_delay_ms: u64,
    pub usage_lookback_ms: u64,
    /// Enables the running-task foreground strategy, only meaningful on legacy platforms
    pub legacy_task_inspection: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 500,
            retry_backoff_ms: 1_000,
            foreground_poll_interval_ms: 300,
            default_wait_ms: 2_000,
            default_attempts: 3,
            no_wait_delay_ms: 1_000,
            usage_lookback_ms: 15_000,
            legacy_task_inspection: false,
        }
    }
}

impl LaunchConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn foreground_poll_interval(&self) -> Duration {
        Duration::from_millis(self.foreground_poll_interval_ms)
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_millis(self.default_wait_ms)
    }

    pub fn no_wait_delay(&self) -> Duration {
        Duration::from_millis(self.no_wait_delay_ms)
    }

    pub fn usage_lookback(&self) -> Duration {
        Duration::from_millis(self.usage_lookback_ms)
    }
}

impl EngineConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.locator_poll_interval_ms.max(1))
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    /// Defaults overlaid with `AUTOTASK_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn from_json(json: &str) -> Result<Self, AutomationError> {
        serde_json::from_str(json)
            .map_err(|e| AutomationError::InvalidArgument(format!("Invalid engine config: {e}")))
    }

    pub(crate) fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read_u64 = |key: &str, target: &mut u64| {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse::<u64>() {
                    Ok(value) => *target = value,
                    Err(_) => warn!("Ignoring {}={:?}: not a non-negative integer", key, raw),
                }
            }
        };

        read_u64("AUTOTASK_TASK_TIMEOUT_MS", &mut self.task_timeout_ms);
        read_u64("AUTOTASK_ACTION_TIMEOUT_MS", &mut self.action_timeout_ms);
        read_u64("AUTOTASK_POLL_INTERVAL_MS", &mut self.locator_poll_interval_ms);
        read_u64("AUTOTASK_CANCEL_GRACE_MS", &mut self.cancel_grace_ms);
        read_u64("AUTOTASK_LAUNCH_SETTLE_MS", &mut self.launch.settle_delay_ms);
        read_u64("AUTOTASK_LAUNCH_BACKOFF_MS", &mut self.launch.retry_backoff_ms);
        read_u64(
            "AUTOTASK_FOREGROUND_POLL_MS",
            &mut self.launch.foreground_poll_interval_ms,
        );
        read_u64("AUTOTASK_USAGE_LOOKBACK_MS", &mut self.launch.usage_lookback_ms);

        if let Some(raw) = lookup("AUTOTASK_LAUNCH_ATTEMPTS") {
            match raw.trim().parse::<u32>() {
                Ok(value) if value > 0 => self.launch.default_attempts = value,
                _ => warn!("Ignoring AUTOTASK_LAUNCH_ATTEMPTS={:?}", raw),
            }
        }
        if let Some(raw) = lookup("AUTOTASK_LEGACY_TASK_INSPECTION") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.launch.legacy_task_inspection = true,
                "0" | "false" | "no" | "off" => self.launch.legacy_task_inspection = false,
                _ => warn!("Ignoring AUTOTASK_LEGACY_TASK_INSPECTION={:?}", raw),
            }
        }
    }
}
