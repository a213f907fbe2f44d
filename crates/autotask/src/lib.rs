//! Chainable UI automation tasks driven by a device accessibility tree
//!
//! Build a [`Task`] from actions (clicks, text input, gestures, key presses,
//! app launches), queue it on a [`TaskManager`] and the worker runs it against
//! an [`AccessibilityEngine`] with timeout, cancellation and result reporting.

use std::sync::{Arc, Once, PoisonError, RwLock};
use tracing::{info, instrument};

pub mod action;
pub mod config;
pub mod element;
pub mod errors;
pub mod executor;
pub mod foreground;
pub mod journal;
pub mod launcher;
pub mod locator;
pub mod notify;
pub mod platforms;
pub mod selector;
pub mod task;
pub mod task_manager;
#[cfg(test)]
mod tests;
pub mod utils;

pub use action::{Action, ActionKind};
pub use config::{EngineConfig, LaunchConfig};
pub use element::{Bounds, ElementAttributes, ElementNode, Point, PreOrder, SerializableElement};
pub use errors::AutomationError;
pub use executor::ActionExecutor;
pub use foreground::{ForegroundDetector, ForegroundStrategy};
pub use journal::{LogEntry, LogSeverity, LogSink, MemorySink, TaskJournal, TracingSink};
pub use launcher::{AppLauncher, LaunchError, LaunchOutcome};
pub use locator::ElementLocator;
pub use notify::{ChannelNotifier, Notification, Notifier, TracingNotifier};
pub use platforms::{AccessibilityEngine, Gesture, GlobalAction, LaunchIntent, MemoryEngine};
pub use selector::{ElementMatchStrategy, Selector};
pub use task::{Task, TaskContext, TaskHandle, TaskReport, TaskStatus};
pub use task_manager::TaskManager;
pub use tokio_util::sync::CancellationToken;

/// Install a `tracing` subscriber once per process.
///
/// Priority: explicit level > RUST_LOG env > AUTOTASK_LOG_LEVEL env > "info".
/// Later calls, or a subscriber installed by the host, win silently.
pub fn init_tracing(log_level: Option<&str>) {
    let log_level = log_level
        .map(str::to_string)
        .or_else(|| std::env::var("RUST_LOG").ok())
        .or_else(|| std::env::var("AUTOTASK_LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .with_ansi(false)
            .try_init();
    });
}

/// An automation engine bound to one device.
///
/// Holds the shared task context and the task manager. Cloning is cheap and
/// every clone drives the same queue.
#[derive(Clone)]
pub struct Automation {
    ctx: TaskContext,
    manager: TaskManager,
    /// Cancels ad-hoc locator and launcher calls (wrapped in RwLock to allow reset)
    cancellation_token: Arc<RwLock<CancellationToken>>,
}

impl Automation {
    /// Engine configured from `AUTOTASK_*` environment variables.
    #[instrument(skip(engine))]
    pub fn new(engine: Arc<dyn AccessibilityEngine>) -> Self {
        Self::with_config(engine, EngineConfig::from_env())
    }

    pub fn with_config(engine: Arc<dyn AccessibilityEngine>, config: EngineConfig) -> Self {
        Self::from_context(TaskContext::new(engine).with_config(config))
    }

    pub fn from_context(ctx: TaskContext) -> Self {
        info!(
            "Automation engine ready (task timeout {}ms, action timeout {}ms)",
            ctx.config.task_timeout_ms, ctx.config.action_timeout_ms
        );
        Self {
            manager: TaskManager::new(ctx.clone()),
            ctx,
            cancellation_token: Arc::new(RwLock::new(CancellationToken::new())),
        }
    }

    pub fn engine(&self) -> &Arc<dyn AccessibilityEngine> {
        &self.ctx.engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    pub fn task_manager(&self) -> &TaskManager {
        &self.manager
    }

    pub fn journal(&self) -> &Arc<TaskJournal> {
        &self.ctx.journal
    }

    pub fn task(&self, name: impl Into<String>) -> Task {
        Task::new(name)
    }

    /// Run a task directly, bypassing the queue. Never overlaps a queued
    /// task, see [`TaskManager::run_exclusive`].
    pub async fn run_task(&self, task: Task) -> TaskReport {
        self.manager.run_exclusive(task).await
    }

    pub fn locator(&self) -> ElementLocator {
        ElementLocator::new(self.ctx.engine.clone())
            .with_poll_interval(self.ctx.config.poll_interval())
            .set_default_timeout(self.ctx.config.action_timeout())
            .with_cancellation(self.cancellation_token())
    }

    pub fn launcher(&self) -> AppLauncher {
        AppLauncher::from_config(self.ctx.engine.clone(), self.ctx.config.launch.clone())
            .with_cancellation(self.cancellation_token())
    }

    pub fn foreground_detector(&self) -> ForegroundDetector {
        ForegroundDetector::from_config(self.ctx.engine.clone(), &self.ctx.config.launch)
    }

    /// Token shared by locators and launchers handed out by this engine.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel in-flight ad-hoc calls. Queued tasks are unaffected; use the
    /// task manager to stop those.
    pub fn stop_execution(&self) {
        info!("Stopping ad-hoc automation calls");
        self.cancellation_token().cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token().is_cancelled()
    }

    /// Replace a cancelled token so new calls can run again.
    pub fn reset_cancellation(&self) {
        let mut token = self
            .cancellation_token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }
}
