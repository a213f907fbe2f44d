use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::action::{Action, ActionKind};
use crate::config::EngineConfig;
use crate::errors::AutomationError;
use crate::launcher::AppLauncher;
use crate::locator::ElementLocator;
use crate::platforms::{AccessibilityEngine, GlobalAction};
use crate::selector::ElementMatchStrategy;
use crate::utils::sleep_cancellable;

const RECENTS_STEP_DELAY: Duration = Duration::from_millis(500);

/// Runs single actions against the engine on behalf of one task.
///
/// All waits, including locator polling and launch retries, observe the
/// task's cancellation token. Actions without their own timeout wait for the
/// configured action timeout, or the launch wait for `LAUNCH_APP`.
pub struct ActionExecutor {
    engine: Arc<dyn AccessibilityEngine>,
    locator: ElementLocator,
    launcher: AppLauncher,
    cancel: CancellationToken,
    default_launch_attempts: u32,
    action_timeout: Duration,
    launch_wait: Duration,
}

impl ActionExecutor {
    pub fn new(
        engine: Arc<dyn AccessibilityEngine>,
        config: &EngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            locator: ElementLocator::new(engine.clone())
                .with_poll_interval(config.poll_interval())
                .set_default_timeout(config.action_timeout())
                .with_cancellation(cancel.clone()),
            launcher: AppLauncher::from_config(engine.clone(), config.launch.clone())
                .with_cancellation(cancel.clone()),
            default_launch_attempts: config.launch.default_attempts,
            action_timeout: config.action_timeout(),
            launch_wait: config.launch.default_wait(),
            engine,
            cancel,
        }
    }

    pub fn locator(&self) -> &ElementLocator {
        &self.locator
    }

    /// The wait `action` gets when it runs here.
    pub fn timeout_for(&self, action: &Action) -> Duration {
        match action.kind {
            ActionKind::LaunchApp => action.timeout_or(self.launch_wait),
            _ => action.timeout_or(self.action_timeout),
        }
    }

    #[instrument(level = "debug", skip(self, action), fields(action = %action))]
    pub async fn execute(&self, action: &Action) -> Result<(), AutomationError> {
        if self.cancel.is_cancelled() {
            return Err(AutomationError::Cancelled(format!("{action} not started")));
        }

        match action.kind {
            ActionKind::Click => self.click(action).await,
            ActionKind::Find => self.find(action).await,
            ActionKind::Wait => sleep_cancellable(action.wait_duration()?, &self.cancel).await,
            ActionKind::InputText => self.input_text(action).await,
            ActionKind::Swipe | ActionKind::Tap | ActionKind::LongPress => {
                self.gesture(action).await
            }
            ActionKind::PressMenu
            | ActionKind::PressHome
            | ActionKind::PressBack
            | ActionKind::PressPower => match action.kind.global_action() {
                Some(global) => self.global(global),
                None => Err(AutomationError::Internal(format!(
                    "{} has no global command",
                    action.kind
                ))),
            },
            ActionKind::LaunchApp => self.launch_app(action).await,
            ActionKind::FindText => self.find_text(action).await,
            ActionKind::ClearRecents => self.clear_recents().await,
        }
    }

    async fn click(&self, action: &Action) -> Result<(), AutomationError> {
        if action.strategy.bypasses_lookup() {
            let point = action.point()?;
            return accepted(self.engine.click_at(point)?, || format!("click at {point}"));
        }

        let element = self
            .locator
            .locate(&action.data, action.strategy, self.timeout_for(action))
            .await?;
        debug!("Clicking {:?}", element);
        accepted(self.engine.click(&element)?, || {
            format!("click on {}:{}", action.strategy, action.data)
        })
    }

    async fn find(&self, action: &Action) -> Result<(), AutomationError> {
        match action.strategy {
            ElementMatchStrategy::ByCoordinates => action.point().map(|_| ()),
            strategy if strategy.collects_all() => {
                let found = self
                    .locator
                    .locate_all(&action.data, strategy, self.timeout_for(action))
                    .await?;
                debug!("{} matched {} element(s)", action, found.len());
                Ok(())
            }
            strategy => self
                .locator
                .locate(&action.data, strategy, self.timeout_for(action))
                .await
                .map(|_| ()),
        }
    }

    async fn input_text(&self, action: &Action) -> Result<(), AutomationError> {
        if action.strategy.bypasses_lookup() {
            return Err(AutomationError::UnsupportedOperation(
                "text input needs an element, not a coordinate".to_string(),
            ));
        }
        let element = self
            .locator
            .locate(&action.data, action.strategy, self.timeout_for(action))
            .await?;
        let text = action.extra.as_deref().unwrap_or_default();
        accepted(self.engine.set_text(&element, text)?, || {
            format!("text input into {}:{}", action.strategy, action.data)
        })
    }

    async fn gesture(&self, action: &Action) -> Result<(), AutomationError> {
        let gesture = action.gesture()?;
        accepted(self.engine.dispatch_gesture(&gesture)?, || {
            format!("{gesture:?}")
        })?;
        sleep_cancellable(gesture.duration(), &self.cancel).await
    }

    fn global(&self, global: GlobalAction) -> Result<(), AutomationError> {
        accepted(self.engine.perform_global_action(global)?, || {
            format!("global action {global:?}")
        })
    }

    async fn launch_app(&self, action: &Action) -> Result<(), AutomationError> {
        let attempts = action.launch_attempts(self.default_launch_attempts)?;
        let outcome = self
            .launcher
            .try_launch(&action.data, self.timeout_for(action), attempts)
            .await?;
        if !outcome.is_confirmed() {
            warn!("{} finished without foreground confirmation: {:?}", action, outcome);
        }
        Ok(())
    }

    async fn find_text(&self, action: &Action) -> Result<(), AutomationError> {
        let (texts, exact) = action.texts();
        let timeout = self.timeout_for(action);
        if self.locator.find_texts(&texts, exact, timeout).await? {
            Ok(())
        } else {
            Err(AutomationError::ElementNotFound(format!(
                "texts [{}] within {}ms",
                texts.join(", "),
                timeout.as_millis()
            )))
        }
    }

    /// Home, then the recents list, then back out of it.
    async fn clear_recents(&self) -> Result<(), AutomationError> {
        self.global(GlobalAction::Home)?;
        sleep_cancellable(RECENTS_STEP_DELAY, &self.cancel).await?;
        self.global(GlobalAction::Recents)?;
        sleep_cancellable(RECENTS_STEP_DELAY, &self.cancel).await?;
        if !self.engine.perform_global_action(GlobalAction::Back)? {
            debug!("Back after recents was rejected");
        }
        Ok(())
    }
}

fn accepted<F>(accepted: bool, what: F) -> Result<(), AutomationError>
where
    F: FnOnce() -> String,
{
    if accepted {
        Ok(())
    } else {
        Err(AutomationError::ActionRejected(what()))
    }
}
