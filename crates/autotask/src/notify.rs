//! Advisory notifications for tasks that end FAILED or TIMEOUT.
//!
//! Delivery is best effort: a notifier that cannot deliver drops the message.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::task::{TaskReport, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub status: TaskStatus,
}

impl Notification {
    /// Notification for a report, or `None` if its status does not warrant one.
    pub fn for_report(report: &TaskReport) -> Option<Self> {
        let title = match report.status {
            TaskStatus::Failed => format!("Task '{}' failed", report.name),
            TaskStatus::Timeout => format!("Task '{}' timed out", report.name),
            _ => return None,
        };
        Some(Self {
            title,
            body: report.message.clone(),
            status: report.status,
        })
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) {
        warn!("{}: {}", notification.title, notification.body);
    }
}

pub type NotificationSender = mpsc::UnboundedSender<Notification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Hands notifications to a channel consumed by a UI surface.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: NotificationSender,
}

impl ChannelNotifier {
    pub fn new(sender: NotificationSender) -> Self {
        Self { sender }
    }

    /// Notifier plus the receiving end of its channel.
    pub fn channel() -> (Self, NotificationReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: &Notification) {
        if self.sender.send(notification.clone()).is_err() {
            debug!("Notification receiver closed, dropping '{}'", notification.title);
        }
    }
}
