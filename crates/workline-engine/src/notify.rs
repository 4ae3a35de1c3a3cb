//! Local notification scheduler interface.
//!
//! The engine schedules at most one notification per distinct message id
//! (the dispatched ledger lives in the engine); routing a notification tap
//! back to its conversation goes through
//! [`SyncEngine::chat_for_notification`](crate::SyncEngine::chat_for_notification).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a scheduled local notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh local notification id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host-provided local notification scheduler.
pub trait NotificationScheduler: Send + Sync {
    /// Display a notification and return its id.
    fn schedule(&self, title: &str, body: &str) -> NotificationId;

    /// Dismiss a previously scheduled notification.
    fn dismiss(&self, id: &NotificationId);
}
