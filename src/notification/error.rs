//! Error types for the notification pipeline.

use thiserror::Error;

/// Defines the possible errors that can occur while notifying a receiver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// The notification was abandoned because its context was cancelled.
    #[error("Notification cancelled")]
    Cancelled,

    /// The notification did not complete before its deadline.
    #[error("Notification deadline exceeded")]
    DeadlineExceeded,

    /// Serializing the notification payload failed.
    #[error("Failed to serialize notification: {0}")]
    Serialization(String),

    /// An error indicating that the notification failed to be sent.
    #[error("Notification failed: {0}")]
    NotifyFailed(String),
}

impl NotificationError {
    /// Returns true if the error is the result of a cancelled context rather
    /// than a failed delivery.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
