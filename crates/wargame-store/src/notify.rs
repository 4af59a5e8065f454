//! User-facing notification side channel
//!
//! Storage failures that the user can act on (export, prune) are reported
//! here in addition to the log. Notifications never block the caller.

use parking_lot::Mutex;
use tracing::{info, warn};

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Informational
    Info,
    /// Something the user should act on
    Warning,
    /// An operation failed
    Error,
}

/// Notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity
    pub level: Level,
    /// Text shown to the user
    pub message: String,
}

/// Receiver of user-facing notifications
pub trait Notifier: Send + Sync {
    /// Deliver a notification
    fn notify(&self, notification: Notification);

    /// Informational shorthand
    fn info(&self, message: &str) {
        self.notify(Notification {
            level: Level::Info,
            message: message.to_string(),
        });
    }

    /// Warning shorthand
    fn warning(&self, message: &str) {
        self.notify(Notification {
            level: Level::Warning,
            message: message.to_string(),
        });
    }

    /// Error shorthand
    fn error(&self, message: &str) {
        self.notify(Notification {
            level: Level::Error,
            message: message.to_string(),
        });
    }
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Info => info!(target: "wargame::notify", "{}", notification.message),
            Level::Warning | Level::Error => {
                warn!(target: "wargame::notify", level = ?notification.level, "{}", notification.message);
            }
        }
    }
}

/// Keeps notifications for inspection
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Empty recorder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    /// Messages delivered so far
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.seen.lock().iter().map(|n| n.message.clone()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}
