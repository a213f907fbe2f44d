//! Action values.
//!
//! An action is an immutable `{kind, data, extra, strategy, timeout_ms}` record.
//! The string payload encodes the kind's arguments:
//!
//! | kind | data | extra |
//! |---|---|---|
//! | `CLICK`, `FIND`, `INPUT_TEXT` | criterion | text to type (`INPUT_TEXT`) |
//! | `WAIT` | milliseconds | |
//! | `TAP` | `x,y` | |
//! | `SWIPE` | `x1,y1,x2,y2` | duration in ms, default 300 |
//! | `LONG_PRESS` | `x,y,duration` | |
//! | `LAUNCH_APP` | package | attempt count, default 3 |
//! | `FIND_TEXT` | texts, one per line | `exact` or `contains` |
//!
//! For `LAUNCH_APP`, `timeout_ms` is the foreground wait. An action without
//! `timeout_ms` uses the engine's configured default when it runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::element::Point;
use crate::errors::AutomationError;
use crate::platforms::{Gesture, GlobalAction};
use crate::selector::{ElementMatchStrategy, Selector};
use crate::utils::{parse_int_list, parse_millis};

pub const DEFAULT_SWIPE_DURATION: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Click,
    Find,
    Wait,
    InputText,
    Swipe,
    Tap,
    LongPress,
    PressMenu,
    PressHome,
    PressBack,
    PressPower,
    LaunchApp,
    /// Wait for a set of texts to be on screen
    FindText,
    /// Dismiss the recent apps list
    ClearRecents,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "CLICK",
            ActionKind::Find => "FIND",
            ActionKind::Wait => "WAIT",
            ActionKind::InputText => "INPUT_TEXT",
            ActionKind::Swipe => "SWIPE",
            ActionKind::Tap => "TAP",
            ActionKind::LongPress => "LONG_PRESS",
            ActionKind::PressMenu => "PRESS_MENU",
            ActionKind::PressHome => "PRESS_HOME",
            ActionKind::PressBack => "PRESS_BACK",
            ActionKind::PressPower => "PRESS_POWER",
            ActionKind::LaunchApp => "LAUNCH_APP",
            ActionKind::FindText => "FIND_TEXT",
            ActionKind::ClearRecents => "CLEAR_RECENTS",
        }
    }

    /// The global command a key press maps to. The menu key opens recent apps.
    pub fn global_action(&self) -> Option<GlobalAction> {
        match self {
            ActionKind::PressMenu => Some(GlobalAction::Recents),
            ActionKind::PressHome => Some(GlobalAction::Home),
            ActionKind::PressBack => Some(GlobalAction::Back),
            ActionKind::PressPower => Some(GlobalAction::Power),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
    #[serde(default)]
    pub strategy: ElementMatchStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Action {
    pub fn new(kind: ActionKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
            extra: None,
            strategy: ElementMatchStrategy::default(),
            timeout_ms: None,
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    pub fn with_strategy(mut self, strategy: ElementMatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Element action built from a parsed selector.
    pub fn targeting(kind: ActionKind, selector: &Selector) -> Result<Self, AutomationError> {
        let strategy = selector
            .strategy()
            .ok_or_else(|| AutomationError::InvalidSelector(selector.criterion()))?;
        Ok(Self::new(kind, selector.criterion()).with_strategy(strategy))
    }

    /// Explicit timeout, if the action carries one.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout().unwrap_or(default)
    }

    /// The criterion as a raw coordinate, for `BY_COORDINATES` actions.
    pub fn point(&self) -> Result<Point, AutomationError> {
        self.data.parse()
    }

    pub fn wait_duration(&self) -> Result<Duration, AutomationError> {
        parse_millis(&self.data)
    }

    /// Decode the gesture carried by a `TAP`, `SWIPE` or `LONG_PRESS` action.
    pub fn gesture(&self) -> Result<Gesture, AutomationError> {
        let to_i32 = |v: i64| {
            i32::try_from(v).map_err(|_| {
                AutomationError::InvalidArgument(format!("Coordinate {v} out of range"))
            })
        };
        let to_ms = |v: i64| {
            u64::try_from(v).map_err(|_| {
                AutomationError::InvalidArgument(format!("Negative duration {v}"))
            })
        };
        let values = parse_int_list(&self.data)?;

        match (self.kind, values.as_slice()) {
            (ActionKind::Tap, &[x, y]) => Ok(Gesture::Tap {
                at: Point::new(to_i32(x)?, to_i32(y)?),
            }),
            (ActionKind::Swipe, &[x1, y1, x2, y2]) => {
                let duration_ms = match self.extra.as_deref() {
                    Some(raw) => parse_millis(raw)?.as_millis() as u64,
                    None => DEFAULT_SWIPE_DURATION.as_millis() as u64,
                };
                Ok(Gesture::Swipe {
                    from: Point::new(to_i32(x1)?, to_i32(y1)?),
                    to: Point::new(to_i32(x2)?, to_i32(y2)?),
                    duration_ms,
                })
            }
            (ActionKind::LongPress, &[x, y, duration]) => Ok(Gesture::LongPress {
                at: Point::new(to_i32(x)?, to_i32(y)?),
                duration_ms: to_ms(duration)?,
            }),
            (ActionKind::Tap | ActionKind::Swipe | ActionKind::LongPress, _) => {
                Err(AutomationError::InvalidArgument(format!(
                    "Malformed {} data '{}'",
                    self.kind, self.data
                )))
            }
            _ => Err(AutomationError::InvalidArgument(format!(
                "{} is not a gesture",
                self.kind
            ))),
        }
    }

    /// Attempt count of a `LAUNCH_APP` action, `default` when unset.
    pub fn launch_attempts(&self, default: u32) -> Result<u32, AutomationError> {
        match self.extra.as_deref().map(str::trim) {
            None | Some("") => Ok(default),
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                AutomationError::InvalidArgument(format!("Invalid attempt count '{raw}'"))
            }),
        }
    }

    /// Texts and match mode of a `FIND_TEXT` action.
    pub fn texts(&self) -> (Vec<String>, bool) {
        let texts = self
            .data
            .lines()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let contains = self
            .extra
            .as_deref()
            .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("contains"));
        (texts, !contains)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ActionKind::Click | ActionKind::Find | ActionKind::InputText => {
                write!(f, "{} {}:{}", self.kind, self.strategy, self.data)
            }
            ActionKind::FindText => write!(f, "{} [{}]", self.kind, self.data.replace('\n', ", ")),
            ActionKind::PressMenu
            | ActionKind::PressHome
            | ActionKind::PressBack
            | ActionKind::PressPower
            | ActionKind::ClearRecents => f.write_str(self.kind.as_str()),
            _ => write!(f, "{} {}", self.kind, self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_wire_names() {
        let action = Action::new(ActionKind::InputText, "username")
            .with_extra("alice")
            .with_strategy(ElementMatchStrategy::ByDescription);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["kind"], "INPUT_TEXT");
        assert_eq!(json["strategy"], "BY_DESCRIPTION");
        assert!(json.get("timeout_ms").is_none());

        let parsed: Action = serde_json::from_str(r#"{"kind": "PRESS_BACK"}"#).unwrap();
        assert_eq!(parsed.strategy, ElementMatchStrategy::ById);
        assert_eq!(parsed.timeout(), None);
        assert_eq!(parsed.timeout_or(Duration::from_millis(700)), Duration::from_millis(700));

        let explicit: Action =
            serde_json::from_str(r#"{"kind": "CLICK", "data": "ok", "timeout_ms": 250}"#).unwrap();
        assert_eq!(explicit.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(explicit.timeout_or(Duration::from_secs(9)), Duration::from_millis(250));
        let json = serde_json::to_value(&explicit).unwrap();
        assert_eq!(json["timeout_ms"], 250);
    }

    #[test]
    fn decodes_gestures() {
        assert_eq!(
            Action::new(ActionKind::Tap, "10, 20").gesture().unwrap(),
            Gesture::Tap { at: Point::new(10, 20) }
        );
        let swipe = Action::new(ActionKind::Swipe, "0,0,100,200").gesture().unwrap();
        assert_eq!(swipe.duration(), DEFAULT_SWIPE_DURATION);
        let slow = Action::new(ActionKind::Swipe, "0,0,100,200")
            .with_extra("800")
            .gesture()
            .unwrap();
        assert_eq!(slow.duration(), Duration::from_millis(800));
        assert_eq!(
            Action::new(ActionKind::LongPress, "5,6,1200").gesture().unwrap(),
            Gesture::LongPress {
                at: Point::new(5, 6),
                duration_ms: 1200
            }
        );

        assert!(Action::new(ActionKind::Tap, "10").gesture().is_err());
        assert!(Action::new(ActionKind::LongPress, "5,6,-1").gesture().is_err());
        assert!(Action::new(ActionKind::Wait, "5,6").gesture().is_err());
    }

    #[test]
    fn menu_key_opens_recents() {
        assert_eq!(ActionKind::PressMenu.global_action(), Some(GlobalAction::Recents));
        assert_eq!(ActionKind::Click.global_action(), None);
    }

    #[test]
    fn find_text_payload() {
        let action = Action::new(ActionKind::FindText, "Wi-Fi\n Bluetooth \n\n").with_extra("CONTAINS");
        let (texts, exact) = action.texts();
        assert_eq!(texts, vec!["Wi-Fi", "Bluetooth"]);
        assert!(!exact);
        assert!(Action::new(ActionKind::FindText, "x").texts().1);
    }

    #[test]
    fn launch_attempts_default_and_parse() {
        let action = Action::new(ActionKind::LaunchApp, "com.example");
        assert_eq!(action.launch_attempts(3).unwrap(), 3);
        assert_eq!(action.clone().with_extra("5").launch_attempts(3).unwrap(), 5);
        assert!(action.with_extra("many").launch_attempts(3).is_err());
    }
}
