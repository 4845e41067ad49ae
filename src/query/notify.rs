//! Centralized, de-duplicated failure notifications.
//!
//! Every query or mutation failure is forwarded to an [`ErrorNotifier`],
//! which renders a title and hands it to a [`NotificationSink`] at most once
//! per notification id. Several queries failing during one page load
//! therefore produce a single visible notification.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::error::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// What failed, used to pick the notification wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Mutation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub severity: Severity,
}

/// Receiver of notifications (a toast area, a status line, a log).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Forwards notifications to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: &Notification) {
        match notification.severity {
            Severity::Error => tracing::error!(id = %notification.id, "{}", notification.title),
            Severity::Warning => tracing::warn!(id = %notification.id, "{}", notification.title),
            Severity::Info | Severity::Success => {
                tracing::info!(id = %notification.id, "{}", notification.title);
            }
        }
    }
}

/// Forwards notifications into a channel, typically drained by an
/// application's subscription so it can render them.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: &Notification) {
        // A closed receiver just means nobody is rendering notifications.
        let _ = self.tx.send(notification.clone());
    }
}

/// Renders the title shown for a failed operation.
pub fn error_title(operation: Operation, error: &QueryError) -> String {
    let action = match operation {
        Operation::Query => "fetch",
        Operation::Mutation => "update",
    };
    let message = error.message();
    if message.is_empty() {
        format!("could not {action} data: error connecting to server")
    } else {
        format!("could not {action} data: {message}")
    }
}

/// De-duplicating front of a [`NotificationSink`].
#[derive(Clone)]
pub struct ErrorNotifier {
    sink: Arc<dyn NotificationSink>,
    error_id: String,
    enabled: bool,
    active: Arc<Mutex<HashSet<String>>>,
}

impl std::fmt::Debug for ErrorNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorNotifier")
            .field("error_id", &self.error_id)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl Default for ErrorNotifier {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl ErrorNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            error_id: "query-error-toast".to_string(),
            enabled: true,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    #[must_use]
    pub fn with_error_id(mut self, error_id: impl Into<String>) -> Self {
        self.error_id = error_id.into();
        self
    }

    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Shows `title` unless a notification with `id` is already active.
    ///
    /// Returns `true` if the sink was invoked.
    pub fn notify_once(&self, id: &str, title: String, severity: Severity) -> bool {
        if !self.enabled {
            return false;
        }
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if !active.insert(id.to_string()) {
                tracing::trace!(id, "notification already active");
                return false;
            }
        }
        self.sink.notify(&Notification {
            id: id.to_string(),
            title,
            severity,
        });
        true
    }

    /// Reports a failed query or mutation under the shared error id.
    pub fn report(&self, operation: Operation, error: &QueryError) -> bool {
        let title = error_title(operation, error);
        self.notify_once(&self.error_id, title, Severity::Error)
    }

    /// Allows the notification `id` to be shown again.
    pub fn dismiss(&self, id: &str) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    /// Starts a new page load: every id may be shown again.
    pub fn reset(&self) {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }
}
