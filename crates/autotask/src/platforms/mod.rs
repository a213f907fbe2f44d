//! Device collaborators consumed by the engine.
//!
//! The engine never talks to a platform directly. Everything it needs (tree
//! snapshots, acts on elements and coordinates, global key commands, package
//! queries and foreground signals) goes through [`AccessibilityEngine`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::element::{ElementNode, Point};
use crate::errors::AutomationError;

pub mod memory;

pub use memory::{EngineEvent, MemoryEngine, PackageSpec};

/// Device-level commands that do not target an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalAction {
    Back,
    Home,
    /// Recent apps; the menu key is mapped here
    Recents,
    Notifications,
    Power,
}

/// Synthetic gestures dispatched at raw screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Gesture {
    Tap {
        at: Point,
    },
    Swipe {
        from: Point,
        to: Point,
        duration_ms: u64,
    },
    LongPress {
        at: Point,
        duration_ms: u64,
    },
}

impl Gesture {
    /// How long the gesture takes to play out on the device.
    pub fn duration(&self) -> Duration {
        match self {
            Gesture::Tap { .. } => TAP_DURATION,
            Gesture::Swipe { duration_ms, .. } | Gesture::LongPress { duration_ms, .. } => {
                Duration::from_millis(*duration_ms)
            }
        }
    }
}

pub const TAP_DURATION: Duration = Duration::from_millis(100);

/// How a launch intent was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    /// The package's registered main entry
    MainEntry,
    /// Implicit main/launcher category query
    LauncherQuery,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaunchIntent {
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    pub source: IntentSource,
}

impl LaunchIntent {
    pub fn main_entry(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            activity: None,
            source: IntentSource::MainEntry,
        }
    }

    pub fn launcher(package: impl Into<String>, activity: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            activity: Some(activity.into()),
            source: IntentSource::LauncherQuery,
        }
    }
}

/// One package's usage record from the platform usage statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub package: String,
    /// Last time the package was in use, milliseconds since the Unix epoch
    pub last_time_used: i64,
}

/// Platform accessibility and device services.
///
/// Implementations are synchronous and must be cheap enough to call from the
/// engine's poll loops. All boolean returns mean "the platform accepted the
/// request"; `Err` is reserved for the platform failing to answer at all.
pub trait AccessibilityEngine: Send + Sync {
    /// Root of the active window, or `None` if no window is available.
    ///
    /// Every returned root is eventually passed to [`release_tree`](Self::release_tree).
    fn root_in_active_window(&self) -> Result<Option<ElementNode>, AutomationError>;

    /// Release platform handles held by a snapshot.
    fn release_tree(&self, _root: &ElementNode) {}

    fn click(&self, element: &ElementNode) -> Result<bool, AutomationError>;

    fn click_at(&self, point: Point) -> Result<bool, AutomationError>;

    fn set_text(&self, element: &ElementNode, text: &str) -> Result<bool, AutomationError>;

    fn dispatch_gesture(&self, gesture: &Gesture) -> Result<bool, AutomationError>;

    fn perform_global_action(&self, action: GlobalAction) -> Result<bool, AutomationError>;

    fn is_package_installed(&self, package: &str) -> bool;

    /// The package's registered main entry intent, if it has one.
    fn launch_intent_for_package(&self, package: &str) -> Option<LaunchIntent>;

    /// Activities answering the implicit main/launcher query for `package`.
    fn query_launcher_activities(&self, package: &str) -> Vec<LaunchIntent>;

    fn start_activity(&self, intent: &LaunchIntent) -> Result<(), AutomationError>;

    /// Usage records within the last `lookback`. Sandboxed platforms return
    /// `UnsupportedOperation`.
    fn query_usage_stats(&self, _lookback: Duration) -> Result<Vec<UsageRecord>, AutomationError> {
        Err(AutomationError::UnsupportedOperation(
            "usage statistics are not available".to_string(),
        ))
    }

    /// Package owning the top running task (legacy platforms only).
    fn running_task_package(&self) -> Result<Option<String>, AutomationError> {
        Err(AutomationError::UnsupportedOperation(
            "running task inspection is not available".to_string(),
        ))
    }
}
