use thiserror::Error;

/// Errors raised while locating elements or executing actions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    /// No element matched before the locator deadline.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The deadline elapsed without a tree snapshot ever becoming available.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The platform refused an act or a global command.
    #[error("Action rejected: {0}")]
    ActionRejected(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("App launch failed: {0}")]
    LaunchFailed(String),

    #[error("Platform error: {0}")]
    PlatformError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AutomationError::Cancelled(_))
    }
}
