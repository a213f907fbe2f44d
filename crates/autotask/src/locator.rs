use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::{DEFAULT_ACTION_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::element::ElementNode;
use crate::errors::AutomationError;
use crate::platforms::AccessibilityEngine;
use crate::selector::{ElementMatchStrategy, Selector};
use crate::utils::{deadline_after, sleep_cancellable};

/// Holds a tree snapshot and hands it back to the engine when dropped.
struct SnapshotGuard<'a> {
    engine: &'a dyn AccessibilityEngine,
    root: ElementNode,
}

impl<'a> SnapshotGuard<'a> {
    fn acquire(engine: &'a dyn AccessibilityEngine) -> Option<Self> {
        match engine.root_in_active_window() {
            Ok(Some(root)) => Some(Self { engine, root }),
            Ok(None) => None,
            Err(e) => {
                debug!("Tree snapshot unavailable: {}", e);
                None
            }
        }
    }
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        self.engine.release_tree(&self.root);
    }
}

/// Polling element search against the active window.
///
/// Every wait races the locator's cancellation token, so a cancelled task
/// stops searching within one poll interval.
#[derive(Clone)]
pub struct ElementLocator {
    engine: Arc<dyn AccessibilityEngine>,
    poll_interval: Duration,
    timeout: Duration, // Used when a call passes no timeout
    cancel: CancellationToken,
}

impl ElementLocator {
    pub fn new(engine: Arc<dyn AccessibilityEngine>) -> Self {
        Self {
            engine,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_ACTION_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tie the locator's waits to `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait up to `timeout` for the first node matching `criterion`.
    ///
    /// Fails with `ElementNotFound` when snapshots were available but nothing
    /// matched, and with `Timeout` when no snapshot could be obtained at all.
    #[instrument(level = "debug", skip(self))]
    pub async fn locate(
        &self,
        criterion: &str,
        strategy: ElementMatchStrategy,
        timeout: Duration,
    ) -> Result<ElementNode, AutomationError> {
        if strategy.bypasses_lookup() {
            return Err(AutomationError::InvalidArgument(format!(
                "'{criterion}' is a coordinate, it cannot be located in the tree"
            )));
        }
        let description = format!("{strategy}:{criterion}");
        self.poll(&description, timeout, |root| {
            root.find_first(&|node: &ElementNode| strategy.matches(node, criterion))
        })
        .await
    }

    /// Wait up to `timeout` for at least one match, returning every match in
    /// the first snapshot that has any.
    #[instrument(level = "debug", skip(self))]
    pub async fn locate_all(
        &self,
        criterion: &str,
        strategy: ElementMatchStrategy,
        timeout: Duration,
    ) -> Result<Vec<ElementNode>, AutomationError> {
        if strategy.bypasses_lookup() {
            return Err(AutomationError::InvalidArgument(format!(
                "'{criterion}' is a coordinate, it cannot be located in the tree"
            )));
        }
        let description = format!("{strategy}:{criterion}");
        self.poll(&description, timeout, |root| {
            let found = root.find_all(&|node: &ElementNode| strategy.matches(node, criterion));
            (!found.is_empty()).then_some(found)
        })
        .await
    }

    /// Locate a parsed selector, waiting `timeout` or the locator's default.
    pub async fn locate_selector(
        &self,
        selector: &Selector,
        timeout: Option<Duration>,
    ) -> Result<ElementNode, AutomationError> {
        let timeout = timeout.unwrap_or(self.timeout);
        match selector.strategy() {
            Some(strategy) => self.locate(&selector.criterion(), strategy, timeout).await,
            None => Err(AutomationError::InvalidSelector(selector.criterion())),
        }
    }

    /// Wait until every entry of `texts` shows up as the text or description of
    /// some node in the active window. `exact` selects equality over substring
    /// matching. Returns `Ok(false)` at the deadline.
    #[instrument(level = "debug", skip(self))]
    pub async fn find_texts(
        &self,
        texts: &[String],
        exact: bool,
        timeout: Duration,
    ) -> Result<bool, AutomationError> {
        if texts.is_empty() {
            return Err(AutomationError::InvalidArgument("no texts to look for".to_string()));
        }
        let description = texts.join("|");
        let outcome = self
            .poll(&description, timeout, |root| {
                let present = |wanted: &String| {
                    root.find_first(&|node: &ElementNode| node_has_text(node, wanted, exact))
                        .is_some()
                };
                texts.iter().all(present).then_some(())
            })
            .await;
        match outcome {
            Ok(()) => Ok(true),
            Err(AutomationError::ElementNotFound(_)) | Err(AutomationError::Timeout(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn poll<T, F>(
        &self,
        description: &str,
        timeout: Duration,
        mut probe: F,
    ) -> Result<T, AutomationError>
    where
        F: FnMut(&ElementNode) -> Option<T>,
    {
        let deadline = deadline_after(timeout);
        let mut saw_snapshot = false;
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(AutomationError::Cancelled(format!(
                    "search for {description} cancelled"
                )));
            }
            attempts += 1;
            if let Some(snapshot) = SnapshotGuard::acquire(self.engine.as_ref()) {
                saw_snapshot = true;
                if let Some(found) = probe(&snapshot.root) {
                    debug!("Found {} after {} attempt(s)", description, attempts);
                    return Ok(found);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep_cancellable(self.poll_interval.min(deadline - now), &self.cancel).await?;
        }

        debug!("Gave up on {} after {} attempt(s)", description, attempts);
        if saw_snapshot {
            Err(AutomationError::ElementNotFound(format!(
                "{description} within {}ms",
                timeout.as_millis()
            )))
        } else {
            Err(AutomationError::Timeout(format!(
                "no active window while looking for {description} within {}ms",
                timeout.as_millis()
            )))
        }
    }
}

fn node_has_text(node: &ElementNode, wanted: &str, exact: bool) -> bool {
    [node.text(), node.description()]
        .into_iter()
        .flatten()
        .any(|value| if exact { value == wanted } else { value.contains(wanted) })
}
