//! Customer-facing notifications.
//!
//! Checkout and cart operations report their outcome to a [`NotificationSink`]
//! in addition to returning it, so a UI can show a toast without inspecting
//! error types.

use std::sync::{Arc, Mutex, PoisonError};

use common::CustomerId;
use serde::Serialize;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Warning,
    Error,
}

/// A message for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub customer_id: CustomerId,
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(customer_id: CustomerId, message: impl Into<String>) -> Self {
        Self::new(customer_id, NotificationLevel::Success, message)
    }

    pub fn warning(customer_id: CustomerId, message: impl Into<String>) -> Self {
        Self::new(customer_id, NotificationLevel::Warning, message)
    }

    pub fn error(customer_id: CustomerId, message: impl Into<String>) -> Self {
        Self::new(customer_id, NotificationLevel::Error, message)
    }

    fn new(customer_id: CustomerId, level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            customer_id,
            level,
            message: message.into(),
        }
    }
}

/// Receives customer notifications.
///
/// Implementations must not block: `notify` is called inline on the
/// checkout path.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let Notification {
            customer_id,
            level,
            message,
        } = notification;
        match level {
            NotificationLevel::Success => {
                tracing::info!(target: "notifications", %customer_id, "{message}")
            }
            NotificationLevel::Warning => {
                tracing::warn!(target: "notifications", %customer_id, "{message}")
            }
            NotificationLevel::Error => {
                tracing::error!(target: "notifications", %customer_id, "{message}")
            }
        }
    }
}

/// Keeps every notification in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything received so far.
    pub fn received(&self) -> Vec<Notification> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns notifications of the given level.
    pub fn with_level(&self, level: NotificationLevel) -> Vec<Notification> {
        self.received()
            .into_iter()
            .filter(|n| n.level == level)
            .collect()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
