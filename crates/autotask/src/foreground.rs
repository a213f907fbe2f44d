use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::LaunchConfig;
use crate::errors::AutomationError;
use crate::platforms::AccessibilityEngine;

/// The signal that confirmed a package is in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForegroundStrategy {
    UsageStats,
    AccessibilityRoot,
    RunningTasks,
}

/// Best-effort check of which package owns the screen.
///
/// A single sample is advisory; callers are expected to poll.
#[derive(Clone)]
pub struct ForegroundDetector {
    engine: Arc<dyn AccessibilityEngine>,
    usage_lookback: Duration,
    legacy_task_inspection: bool,
}

impl ForegroundDetector {
    pub fn new(engine: Arc<dyn AccessibilityEngine>) -> Self {
        Self::from_config(engine, &LaunchConfig::default())
    }

    pub fn from_config(engine: Arc<dyn AccessibilityEngine>, config: &LaunchConfig) -> Self {
        Self {
            engine,
            usage_lookback: config.usage_lookback(),
            legacy_task_inspection: config.legacy_task_inspection,
        }
    }

    pub fn with_legacy_task_inspection(mut self, enabled: bool) -> Self {
        self.legacy_task_inspection = enabled;
        self
    }

    /// Whether `package` is in the foreground according to any strategy.
    pub fn is_foreground(&self, package: &str) -> bool {
        self.detect(package).is_some()
    }

    /// The first strategy, in priority order, that places `package` in the
    /// foreground. Strategy failures count as "not confirmed".
    pub fn detect(&self, package: &str) -> Option<ForegroundStrategy> {
        if package.is_empty() {
            return None;
        }

        let mut strategies = vec![
            ForegroundStrategy::UsageStats,
            ForegroundStrategy::AccessibilityRoot,
        ];
        if self.legacy_task_inspection {
            strategies.push(ForegroundStrategy::RunningTasks);
        }

        strategies.into_iter().find(|strategy| {
            match self.check(*strategy, package) {
                Ok(confirmed) => {
                    trace!("{:?} says {} foreground={}", strategy, package, confirmed);
                    confirmed
                }
                Err(e) => {
                    debug!("Foreground strategy {:?} failed: {}", strategy, e);
                    false
                }
            }
        })
    }

    fn check(&self, strategy: ForegroundStrategy, package: &str) -> Result<bool, AutomationError> {
        match strategy {
            ForegroundStrategy::UsageStats => {
                Ok(self.most_recent_package()?.as_deref() == Some(package))
            }
            ForegroundStrategy::AccessibilityRoot => {
                let Some(root) = self.engine.root_in_active_window()? else {
                    return Ok(false);
                };
                let owner = root.package_name() == Some(package);
                self.engine.release_tree(&root);
                Ok(owner)
            }
            ForegroundStrategy::RunningTasks => {
                Ok(self.engine.running_task_package()?.as_deref() == Some(package))
            }
        }
    }

    /// Package with the latest use inside the lookback window.
    fn most_recent_package(&self) -> Result<Option<String>, AutomationError> {
        let records = self.engine.query_usage_stats(self.usage_lookback)?;
        let cutoff = chrono::Utc::now().timestamp_millis() - self.usage_lookback.as_millis() as i64;
        Ok(records
            .into_iter()
            .filter(|record| record.last_time_used >= cutoff)
            .max_by_key(|record| record.last_time_used)
            .map(|record| record.package))
    }
}
