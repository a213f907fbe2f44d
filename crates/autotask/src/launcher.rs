use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::LaunchConfig;
use crate::errors::AutomationError;
use crate::foreground::ForegroundDetector;
use crate::platforms::{AccessibilityEngine, LaunchIntent};
use crate::utils::sleep_cancellable;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("Invalid package name: {0:?}")]
    InvalidPackage(String),

    #[error("Package not installed: {0}")]
    NotInstalled(String),

    /// Neither the main entry nor the launcher query produced a startable intent.
    #[error("No launch intent could be started for {0}")]
    LaunchIntentFailed(String),

    #[error("Launch of {0} interrupted")]
    Interrupted(String),
}

impl From<LaunchError> for AutomationError {
    fn from(error: LaunchError) -> Self {
        match error {
            LaunchError::Interrupted(_) => AutomationError::Cancelled(error.to_string()),
            other => AutomationError::LaunchFailed(other.to_string()),
        }
    }
}

/// How a successful launch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A foreground strategy confirmed the package.
    Foreground { attempts: u32 },
    /// The intent was dispatched and the caller asked not to wait.
    Dispatched,
    /// Every attempt dispatched an intent but the package was never seen in
    /// the foreground. The process most likely started anyway.
    Unconfirmed { attempts: u32 },
}

impl LaunchOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, LaunchOutcome::Foreground { .. })
    }
}

/// Starts packages and waits for them to reach the foreground, with retries.
#[derive(Clone)]
pub struct AppLauncher {
    engine: Arc<dyn AccessibilityEngine>,
    detector: ForegroundDetector,
    config: LaunchConfig,
    cancel: CancellationToken,
}

impl AppLauncher {
    pub fn new(engine: Arc<dyn AccessibilityEngine>) -> Self {
        Self::from_config(engine, LaunchConfig::default())
    }

    pub fn from_config(engine: Arc<dyn AccessibilityEngine>, config: LaunchConfig) -> Self {
        Self {
            detector: ForegroundDetector::from_config(engine.clone(), &config),
            engine,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie the launcher's waits to `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn detector(&self) -> &ForegroundDetector {
        &self.detector
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Launch `package`, returning whether the launch should be considered
    /// successful.
    ///
    /// A package that was dispatched on every attempt but never confirmed in
    /// the foreground still counts as launched. Missing packages and intent
    /// failures are hard failures.
    pub async fn launch(&self, package: &str, wait: Duration, max_attempts: u32) -> bool {
        match self.try_launch(package, wait, max_attempts).await {
            Ok(outcome) => {
                debug!("Launch of {} finished: {:?}", package, outcome);
                true
            }
            Err(e) => {
                warn!("Launch of {} failed: {}", package, e);
                false
            }
        }
    }

    /// Launch with the configured default wait and attempt count.
    pub async fn launch_default(&self, package: &str) -> bool {
        self.launch(package, self.config.default_wait(), self.config.default_attempts)
            .await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn try_launch(
        &self,
        package: &str,
        wait: Duration,
        max_attempts: u32,
    ) -> Result<LaunchOutcome, LaunchError> {
        let package = package.trim();
        if package.is_empty() {
            return Err(LaunchError::InvalidPackage(package.to_string()));
        }
        if !self.engine.is_package_installed(package) {
            return Err(LaunchError::NotInstalled(package.to_string()));
        }

        let max_attempts = max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let last = attempt == max_attempts;
            if attempt == 1 {
                self.pause(self.config.settle_delay(), package).await?;
            }
            info!("Launching {} (attempt {}/{})", package, attempt, max_attempts);

            match self.dispatch(package) {
                Ok(intent) => {
                    debug!("Dispatched {:?}", intent);
                    if wait.is_zero() {
                        self.pause(self.config.no_wait_delay(), package).await?;
                        return Ok(LaunchOutcome::Dispatched);
                    }
                    if self.wait_for_foreground(package, wait).await? {
                        info!("{} reached the foreground on attempt {}", package, attempt);
                        return Ok(LaunchOutcome::Foreground { attempts: attempt });
                    }
                    if last {
                        warn!(
                            "{} was never seen in the foreground, assuming it started",
                            package
                        );
                        return Ok(LaunchOutcome::Unconfirmed { attempts: attempt });
                    }
                    warn!("{} not in the foreground after {}ms", package, wait.as_millis());
                }
                Err(e) => {
                    if last {
                        return Err(e);
                    }
                    warn!("Attempt {} for {} failed: {}", attempt, package, e);
                }
            }

            self.pause(self.config.retry_backoff(), package).await?;
        }

        // The loop returns on its final iteration.
        Err(LaunchError::LaunchIntentFailed(package.to_string()))
    }

    /// Start the main entry intent, falling back to the launcher query.
    fn dispatch(&self, package: &str) -> Result<LaunchIntent, LaunchError> {
        if let Some(intent) = self.engine.launch_intent_for_package(package) {
            match self.engine.start_activity(&intent) {
                Ok(()) => return Ok(intent),
                Err(e) => debug!("Main entry for {} rejected: {}", package, e),
            }
        } else {
            debug!("{} has no main entry, querying launcher activities", package);
        }

        let candidate = self
            .engine
            .query_launcher_activities(package)
            .into_iter()
            .next()
            .ok_or_else(|| LaunchError::LaunchIntentFailed(package.to_string()))?;
        self.engine.start_activity(&candidate).map_err(|e| {
            debug!("Launcher activity for {} rejected: {}", package, e);
            LaunchError::LaunchIntentFailed(package.to_string())
        })?;
        Ok(candidate)
    }

    /// Poll the detector until `wait` elapses, then check once more.
    async fn wait_for_foreground(&self, package: &str, wait: Duration) -> Result<bool, LaunchError> {
        let started = Instant::now();
        let interval = self.config.foreground_poll_interval();

        while started.elapsed() < wait {
            if let Some(strategy) = self.detector.detect(package) {
                debug!("{} confirmed in the foreground by {:?}", package, strategy);
                return Ok(true);
            }
            self.pause(interval, package).await?;
        }

        Ok(self.detector.is_foreground(package))
    }

    async fn pause(&self, duration: Duration, package: &str) -> Result<(), LaunchError> {
        sleep_cancellable(duration, &self.cancel)
            .await
            .map_err(|_| LaunchError::Interrupted(package.to_string()))
    }
}
