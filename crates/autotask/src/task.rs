//! Automation tasks.
//!
//! A [`Task`] is a named chain of actions built fluently and run once. Running
//! spawns the action loop and supervises it against the task timeout; the
//! first terminal status wins and is delivered exactly once to the result
//! callback, the completion channel and the journal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::action::{Action, ActionKind};
use crate::config::EngineConfig;
use crate::errors::AutomationError;
use crate::executor::ActionExecutor;
use crate::journal::TaskJournal;
use crate::notify::{Notification, Notifier, TracingNotifier};
use crate::platforms::AccessibilityEngine;
use crate::selector::ElementMatchStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Timeout => "TIMEOUT",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single terminal report of a task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub id: Uuid,
    pub name: String,
    pub status: TaskStatus,
    pub message: String,
    /// Action executing when the task ended; `None` if the task succeeded or
    /// never started one.
    pub action_index: Option<usize>,
    pub action_count: usize,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl TaskReport {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub type ResultCallback = Arc<dyn Fn(&TaskReport) + Send + Sync>;

const NO_ACTION: usize = usize::MAX;

pub(crate) struct TaskState {
    id: Uuid,
    name: String,
    status: Mutex<TaskStatus>,
    cancel: CancellationToken,
    current_action: AtomicUsize,
}

impl TaskState {
    fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            status: Mutex::new(TaskStatus::Pending),
            cancel: CancellationToken::new(),
            current_action: AtomicUsize::new(NO_ACTION),
        }
    }

    fn status(&self) -> TaskStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// PENDING -> RUNNING. False if the task was cancelled first.
    fn start(&self) -> bool {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == TaskStatus::Pending {
            *status = TaskStatus::Running;
            true
        } else {
            false
        }
    }

    /// Move to `terminal` unless a terminal status is already set.
    fn finish(&self, terminal: TaskStatus) -> bool {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if status.is_terminal() {
            return false;
        }
        *status = terminal;
        true
    }

    fn current_action(&self) -> Option<usize> {
        match self.current_action.load(Ordering::SeqCst) {
            NO_ACTION => None,
            index => Some(index),
        }
    }
}

/// Observer and cancel switch for a task instance. Cheap to clone.
#[derive(Clone)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn current_action(&self) -> Option<usize> {
        self.state.current_action()
    }

    /// Cancel the task. Returns false if it had already reached a terminal
    /// status, in which case nothing changes.
    pub fn cancel(&self) -> bool {
        if self.state.finish(TaskStatus::Cancelled) {
            self.state.cancel.cancel();
            info!("Task '{}' ({}) cancelled", self.state.name, self.state.id);
            true
        } else {
            false
        }
    }

    pub fn same_task(&self, other: &TaskHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.state.id)
            .field("name", &self.state.name)
            .field("status", &self.status())
            .finish()
    }
}

/// Shared collaborators a task runs against.
#[derive(Clone)]
pub struct TaskContext {
    pub engine: Arc<dyn AccessibilityEngine>,
    pub config: Arc<EngineConfig>,
    pub journal: Arc<TaskJournal>,
    pub notifier: Arc<dyn Notifier>,
}

impl TaskContext {
    pub fn new(engine: Arc<dyn AccessibilityEngine>) -> Self {
        Self {
            engine,
            config: Arc::new(EngineConfig::default()),
            journal: Arc::new(TaskJournal::new()),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_journal(mut self, journal: Arc<TaskJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// A named, ordered chain of actions.
///
/// ```no_run
/// # use autotask::Task;
/// # use std::time::Duration;
/// let task = Task::new("login")
///     .launch_app("com.example.app")
///     .input_text("username", "alice")
///     .click("login_button")
///     .set_timeout(Duration::from_secs(20))
///     .on_result(|report| println!("{report}"));
/// ```
pub struct Task {
    state: Arc<TaskState>,
    actions: Vec<Action>,
    timeout: Option<Duration>,
    callback: Option<ResultCallback>,
    completion: Option<oneshot::Sender<TaskReport>>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(TaskState::new(name.into())),
            actions: Vec::new(),
            timeout: None,
            callback: None,
            completion: None,
        }
    }

    /// Rebuild a task from a stored action list.
    pub fn from_actions(name: impl Into<String>, actions: Vec<Action>) -> Self {
        let mut task = Self::new(name);
        task.actions = actions;
        task
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// The explicit timeout, if one was set.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            state: self.state.clone(),
        }
    }

    /// A fresh PENDING instance with the same name, actions, timeout and
    /// callback. The completion channel stays with this instance.
    pub fn restarted(&self) -> Self {
        Self {
            state: Arc::new(TaskState::new(self.state.name.clone())),
            actions: self.actions.clone(),
            timeout: self.timeout,
            callback: self.callback.clone(),
            completion: None,
        }
    }

    /// Receiver for this instance's terminal report. A second call replaces
    /// the first receiver.
    pub fn completion(&mut self) -> oneshot::Receiver<TaskReport> {
        let (sender, receiver) = oneshot::channel();
        self.completion = Some(sender);
        receiver
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn set_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_result<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TaskReport) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Click the element with resource id `id`.
    pub fn click(self, id: &str) -> Self {
        self.click_by(id, ElementMatchStrategy::ById)
    }

    pub fn click_by(self, criterion: &str, strategy: ElementMatchStrategy) -> Self {
        self.with_action(Action::new(ActionKind::Click, criterion).with_strategy(strategy))
    }

    /// Click with a locator wait of `timeout` instead of the configured one.
    pub fn click_with_timeout(
        self,
        criterion: &str,
        strategy: ElementMatchStrategy,
        timeout: Duration,
    ) -> Self {
        self.with_action(
            Action::new(ActionKind::Click, criterion)
                .with_strategy(strategy)
                .with_timeout(timeout),
        )
    }

    pub fn click_at(self, x: i32, y: i32) -> Self {
        self.click_by(&format!("{x},{y}"), ElementMatchStrategy::ByCoordinates)
    }

    pub fn find_element(self, id: &str) -> Self {
        self.find_element_by(id, ElementMatchStrategy::ById)
    }

    pub fn find_element_by(self, criterion: &str, strategy: ElementMatchStrategy) -> Self {
        self.with_action(Action::new(ActionKind::Find, criterion).with_strategy(strategy))
    }

    pub fn find_element_with_timeout(
        self,
        criterion: &str,
        strategy: ElementMatchStrategy,
        timeout: Duration,
    ) -> Self {
        self.with_action(
            Action::new(ActionKind::Find, criterion)
                .with_strategy(strategy)
                .with_timeout(timeout),
        )
    }

    pub fn wait_for(self, millis: u64) -> Self {
        self.with_action(Action::new(ActionKind::Wait, millis.to_string()))
    }

    pub fn input_text(self, id: &str, text: &str) -> Self {
        self.input_text_by(id, ElementMatchStrategy::ById, text)
    }

    pub fn input_text_by(self, criterion: &str, strategy: ElementMatchStrategy, text: &str) -> Self {
        self.with_action(
            Action::new(ActionKind::InputText, criterion)
                .with_strategy(strategy)
                .with_extra(text),
        )
    }

    pub fn input_text_with_timeout(
        self,
        criterion: &str,
        strategy: ElementMatchStrategy,
        text: &str,
        timeout: Duration,
    ) -> Self {
        self.with_action(
            Action::new(ActionKind::InputText, criterion)
                .with_strategy(strategy)
                .with_extra(text)
                .with_timeout(timeout),
        )
    }

    pub fn swipe(self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> Self {
        self.with_action(
            Action::new(ActionKind::Swipe, format!("{x1},{y1},{x2},{y2}"))
                .with_extra(duration_ms.to_string()),
        )
    }

    pub fn tap(self, x: i32, y: i32) -> Self {
        self.with_action(Action::new(ActionKind::Tap, format!("{x},{y}")))
    }

    pub fn long_press(self, x: i32, y: i32, duration_ms: u64) -> Self {
        self.with_action(Action::new(
            ActionKind::LongPress,
            format!("{x},{y},{duration_ms}"),
        ))
    }

    pub fn press_menu(self) -> Self {
        self.with_action(Action::new(ActionKind::PressMenu, ""))
    }

    pub fn press_home(self) -> Self {
        self.with_action(Action::new(ActionKind::PressHome, ""))
    }

    pub fn press_back(self) -> Self {
        self.with_action(Action::new(ActionKind::PressBack, ""))
    }

    pub fn press_power(self) -> Self {
        self.with_action(Action::new(ActionKind::PressPower, ""))
    }

    /// Launch `package`, waiting the configured launch wait (2s by default)
    /// for it to reach the foreground.
    pub fn launch_app(self, package: &str) -> Self {
        self.with_action(Action::new(ActionKind::LaunchApp, package))
    }

    pub fn launch_app_with(self, package: &str, wait: Duration, max_attempts: u32) -> Self {
        self.with_action(
            Action::new(ActionKind::LaunchApp, package)
                .with_timeout(wait)
                .with_extra(max_attempts.to_string()),
        )
    }

    /// Wait until every entry of `texts` is on screen.
    pub fn find_text(self, texts: &[&str], exact: bool) -> Self {
        self.with_action(
            Action::new(ActionKind::FindText, texts.join("\n"))
                .with_extra(if exact { "exact" } else { "contains" }),
        )
    }

    pub fn clear_recents(self) -> Self {
        self.with_action(Action::new(ActionKind::ClearRecents, ""))
    }

    /// Execute the task to its single terminal status.
    ///
    /// A task cancelled before this call reports CANCELLED without executing
    /// anything.
    #[instrument(skip_all, fields(task = %self.state.name, id = %self.state.id))]
    pub async fn run(self, ctx: &TaskContext) -> TaskReport {
        let Task {
            state,
            actions,
            timeout,
            callback,
            completion,
        } = self;
        let started = Instant::now();
        let timeout = timeout.unwrap_or_else(|| ctx.config.task_timeout());
        let action_count = actions.len();
        let mut error_text = None;

        if state.start() {
            ctx.journal.log(format!(
                "Task '{}' started ({} actions, {}ms limit)",
                state.name,
                action_count,
                timeout.as_millis()
            ));

            let mut worker = tokio::spawn(execute_actions(state.clone(), actions, ctx.clone()));
            match tokio::time::timeout(timeout, &mut worker).await.ok() {
                Some(Ok(Ok(()))) => {
                    state.finish(TaskStatus::Success);
                }
                Some(Ok(Err((index, e)))) => {
                    if e.is_cancelled() {
                        debug!("Action {} stopped by cancellation: {}", index, e);
                        state.finish(TaskStatus::Cancelled);
                    } else {
                        error_text = Some(e.to_string());
                        state.finish(TaskStatus::Failed);
                    }
                }
                Some(Err(join_error)) => {
                    error!("Task worker died: {}", join_error);
                    error_text = Some(format!("worker died: {join_error}"));
                    state.finish(TaskStatus::Failed);
                }
                None => {
                    if state.finish(TaskStatus::Timeout) {
                        warn!("Task '{}' hit its {}ms deadline", state.name, timeout.as_millis());
                    }
                    state.cancel.cancel();
                    if tokio::time::timeout(ctx.config.cancel_grace(), &mut worker)
                        .await
                        .is_err()
                    {
                        warn!("Task worker ignored cancellation, aborting it");
                        worker.abort();
                    }
                }
            }
        } else {
            debug!("Task '{}' was cancelled before it started", state.name);
        }

        let status = state.status();
        let action_index = match status {
            TaskStatus::Success => None,
            _ => state.current_action(),
        };
        let report = TaskReport {
            id: state.id,
            name: state.name.clone(),
            message: describe(
                &state.name,
                status,
                action_index,
                action_count,
                timeout,
                error_text.as_deref(),
            ),
            status,
            action_index,
            action_count,
            error: error_text,
            elapsed: started.elapsed(),
        };

        ctx.journal.log(report.message.clone());
        if let Some(notification) = Notification::for_report(&report) {
            ctx.notifier.notify(&notification);
        }
        if let Some(callback) = callback {
            callback(&report);
        }
        if let Some(sender) = completion {
            let _ = sender.send(report.clone());
        }
        report
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.state.id)
            .field("name", &self.state.name)
            .field("status", &self.status())
            .field("actions", &self.actions)
            .field("timeout", &self.timeout)
            .finish()
    }
}

async fn execute_actions(
    state: Arc<TaskState>,
    actions: Vec<Action>,
    ctx: TaskContext,
) -> Result<(), (usize, AutomationError)> {
    let executor = ActionExecutor::new(ctx.engine.clone(), &ctx.config, state.cancel.clone());
    let total = actions.len();

    for (index, action) in actions.iter().enumerate() {
        if state.cancel.is_cancelled() {
            return Err((
                index,
                AutomationError::Cancelled(format!("before action {}", index + 1)),
            ));
        }
        state.current_action.store(index, Ordering::SeqCst);
        ctx.journal
            .log(format!("Action {}/{} started: {}", index + 1, total, action));
        executor.execute(action).await.map_err(|e| (index, e))?;
        ctx.journal
            .log(format!("Action {}/{} succeeded: {}", index + 1, total, action));
    }
    Ok(())
}

fn describe(
    name: &str,
    status: TaskStatus,
    action_index: Option<usize>,
    action_count: usize,
    timeout: Duration,
    error: Option<&str>,
) -> String {
    let at = match action_index {
        Some(index) => format!(" at action {}/{}", index + 1, action_count),
        None => String::new(),
    };
    match status {
        TaskStatus::Success => {
            format!("Task '{name}' completed successfully ({action_count} actions)")
        }
        TaskStatus::Failed => {
            format!("Task '{name}' failed{at}: {}", error.unwrap_or("unknown"))
        }
        TaskStatus::Timeout => {
            format!("Task '{name}' timed out after {}ms{at}", timeout.as_millis())
        }
        TaskStatus::Cancelled => format!("Task '{name}' cancelled{at}"),
        TaskStatus::Pending | TaskStatus::Running => format!("Task '{name}' is {status}"),
    }
}
