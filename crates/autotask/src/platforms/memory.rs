//! In-memory device used for headless dry runs and deterministic tests.
//!
//! Windows, installed packages and foreground signals are scripted up front;
//! every act the engine performs is recorded as an [`EngineEvent`]. Time is
//! read from `tokio::time`, so scripted delays follow a paused test clock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::{AccessibilityEngine, Gesture, GlobalAction, LaunchIntent, UsageRecord};
use crate::element::{ElementAttributes, ElementNode, Point, SerializableElement};
use crate::errors::AutomationError;
use crate::utils::deadline_after;

/// How a scripted package behaves when launched.
#[derive(Debug, Clone, Default)]
pub struct PackageSpec {
    pub main_entry: bool,
    pub launcher_activities: Vec<String>,
    /// Delay between a successful start and the package owning the active
    /// window; `None` means it never comes to the foreground.
    pub foreground_after: Option<Duration>,
    /// Window shown once the package is in the foreground
    pub window: Option<SerializableElement>,
    pub reject_start: bool,
}

impl PackageSpec {
    /// A package with a main entry that comes to the foreground immediately.
    pub fn launchable() -> Self {
        Self {
            main_entry: true,
            foreground_after: Some(Duration::ZERO),
            ..Default::default()
        }
    }

    pub fn foreground_after(mut self, delay: Duration) -> Self {
        self.foreground_after = Some(delay);
        self
    }

    pub fn never_foreground(mut self) -> Self {
        self.foreground_after = None;
        self
    }

    pub fn without_main_entry(mut self) -> Self {
        self.main_entry = false;
        self
    }

    pub fn launcher_activity(mut self, activity: impl Into<String>) -> Self {
        self.launcher_activities.push(activity.into());
        self
    }

    pub fn window(mut self, window: SerializableElement) -> Self {
        self.window = Some(window);
        self
    }

    pub fn rejecting_start(mut self) -> Self {
        self.reject_start = true;
        self
    }
}

/// Every act performed against the device, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Click { handle: u64, label: Option<String> },
    ClickAt(Point),
    SetText { handle: u64, text: String },
    Gesture(Gesture),
    Global(GlobalAction),
    StartActivity(LaunchIntent),
}

struct PendingWindow {
    ready_at: Instant,
    window: Option<SerializableElement>,
}

#[derive(Default)]
struct MemoryState {
    active: Option<SerializableElement>,
    pending: Vec<PendingWindow>,
    packages: HashMap<String, PackageSpec>,
    usage_stats: Option<Vec<UsageRecord>>,
    running_task: Option<Option<String>>,
    rejected_globals: HashSet<GlobalAction>,
    reject_clicks: bool,
    reject_text: bool,
    reject_gestures: bool,
    events: Vec<EngineEvent>,
}

impl MemoryState {
    /// Apply scripted window changes whose time has come, oldest first.
    fn refresh(&mut self, now: Instant) {
        if self.pending.is_empty() {
            return;
        }
        self.pending.sort_by_key(|p| p.ready_at);
        let split = self.pending.partition_point(|p| p.ready_at <= now);
        for change in self.pending.drain(..split) {
            self.active = change.window;
        }
    }

    fn schedule(&mut self, delay: Duration, window: Option<SerializableElement>) {
        let now = Instant::now();
        self.pending.push(PendingWindow {
            ready_at: deadline_after(delay),
            window,
        });
        self.refresh(now);
    }
}

#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<MemoryState>,
    root_queries: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `window` as the active window.
    pub fn with_window(window: SerializableElement) -> Self {
        let engine = Self::new();
        engine.set_window(Some(window));
        engine
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_window(&self, window: Option<SerializableElement>) {
        let mut state = self.state();
        state.pending.clear();
        state.active = window;
    }

    /// Replace the active window once `delay` has elapsed.
    pub fn show_window_after(&self, delay: Duration, window: SerializableElement) {
        self.state().schedule(delay, Some(window));
    }

    /// Remove the active window once `delay` has elapsed.
    pub fn clear_window_after(&self, delay: Duration) {
        self.state().schedule(delay, None);
    }

    pub fn install(&self, package: impl Into<String>, spec: PackageSpec) {
        self.state().packages.insert(package.into(), spec);
    }

    pub fn uninstall(&self, package: &str) {
        self.state().packages.remove(package);
    }

    /// `None` makes usage statistics unavailable, as on a sandboxed device.
    pub fn set_usage_stats(&self, records: Option<Vec<UsageRecord>>) {
        self.state().usage_stats = records;
    }

    pub fn set_running_task_package(&self, package: Option<&str>) {
        self.state().running_task = Some(package.map(str::to_string));
    }

    pub fn reject_global_action(&self, action: GlobalAction) {
        self.state().rejected_globals.insert(action);
    }

    pub fn reject_clicks(&self, reject: bool) {
        self.state().reject_clicks = reject;
    }

    pub fn reject_text_input(&self, reject: bool) {
        self.state().reject_text = reject;
    }

    pub fn reject_gestures(&self, reject: bool) {
        self.state().reject_gestures = reject;
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    /// Package owning the active window right now.
    pub fn foreground_package(&self) -> Option<String> {
        let mut state = self.state();
        state.refresh(Instant::now());
        state
            .active
            .as_ref()
            .and_then(|w| w.attributes.package_name.clone())
    }

    /// Number of `root_in_active_window` calls, with or without a window.
    pub fn root_queries(&self) -> usize {
        self.root_queries.load(Ordering::SeqCst)
    }

    pub fn acquired_snapshots(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released_snapshots(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn record(&self, event: EngineEvent) {
        debug!("MemoryEngine event: {:?}", event);
        self.state().events.push(event);
    }
}

impl AccessibilityEngine for MemoryEngine {
    fn root_in_active_window(&self) -> Result<Option<ElementNode>, AutomationError> {
        self.root_queries.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();
        state.refresh(Instant::now());
        let root = state.active.as_ref().map(ElementNode::from);
        if root.is_some() {
            self.acquired.fetch_add(1, Ordering::SeqCst);
        }
        Ok(root)
    }

    fn release_tree(&self, _root: &ElementNode) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn click(&self, element: &ElementNode) -> Result<bool, AutomationError> {
        if self.state().reject_clicks {
            return Ok(false);
        }
        let label = element
            .text()
            .or_else(|| element.short_id())
            .map(str::to_string);
        self.record(EngineEvent::Click {
            handle: element.handle(),
            label,
        });
        Ok(true)
    }

    fn click_at(&self, point: Point) -> Result<bool, AutomationError> {
        if self.state().reject_clicks {
            return Ok(false);
        }
        self.record(EngineEvent::ClickAt(point));
        Ok(true)
    }

    fn set_text(&self, element: &ElementNode, text: &str) -> Result<bool, AutomationError> {
        if self.state().reject_text {
            return Ok(false);
        }
        self.record(EngineEvent::SetText {
            handle: element.handle(),
            text: text.to_string(),
        });
        Ok(true)
    }

    fn dispatch_gesture(&self, gesture: &Gesture) -> Result<bool, AutomationError> {
        if self.state().reject_gestures {
            return Ok(false);
        }
        self.record(EngineEvent::Gesture(*gesture));
        Ok(true)
    }

    fn perform_global_action(&self, action: GlobalAction) -> Result<bool, AutomationError> {
        if self.state().rejected_globals.contains(&action) {
            return Ok(false);
        }
        self.record(EngineEvent::Global(action));
        Ok(true)
    }

    fn is_package_installed(&self, package: &str) -> bool {
        self.state().packages.contains_key(package)
    }

    fn launch_intent_for_package(&self, package: &str) -> Option<LaunchIntent> {
        self.state()
            .packages
            .get(package)
            .filter(|spec| spec.main_entry)
            .map(|_| LaunchIntent::main_entry(package))
    }

    fn query_launcher_activities(&self, package: &str) -> Vec<LaunchIntent> {
        self.state()
            .packages
            .get(package)
            .map(|spec| {
                spec.launcher_activities
                    .iter()
                    .map(|activity| LaunchIntent::launcher(package, activity.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn start_activity(&self, intent: &LaunchIntent) -> Result<(), AutomationError> {
        let spec = self.state().packages.get(&intent.package).cloned();
        let spec = spec.ok_or_else(|| {
            AutomationError::PlatformError(format!("No such package: {}", intent.package))
        })?;
        if spec.reject_start {
            return Err(AutomationError::PlatformError(format!(
                "Activity start refused for {}",
                intent.package
            )));
        }
        self.record(EngineEvent::StartActivity(intent.clone()));

        if let Some(delay) = spec.foreground_after {
            let mut window = spec.window.unwrap_or_else(|| SerializableElement {
                handle: 0,
                attributes: ElementAttributes {
                    class_name: Some("android.widget.FrameLayout".to_string()),
                    visible: true,
                    ..Default::default()
                },
                children: vec![],
            });
            window.attributes.package_name = Some(intent.package.clone());
            self.state().schedule(delay, Some(window));
        }
        Ok(())
    }

    fn query_usage_stats(&self, _lookback: Duration) -> Result<Vec<UsageRecord>, AutomationError> {
        self.state().usage_stats.clone().ok_or_else(|| {
            AutomationError::UnsupportedOperation("usage statistics are not available".to_string())
        })
    }

    fn running_task_package(&self) -> Result<Option<String>, AutomationError> {
        self.state().running_task.clone().ok_or_else(|| {
            AutomationError::UnsupportedOperation(
                "running task inspection is not available".to_string(),
            )
        })
    }
}
