//! This module defines the interface of the stream of alerts feeding the
//! dispatcher.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::models::Alert;

/// Custom error type for alert source operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The subscriber fell behind and missed alerts.
    #[error("Subscriber lagged behind and skipped {0} alerts")]
    Lagged(u64),

    /// Reading from the underlying input failed.
    #[error("Failed to read alerts: {0}")]
    Io(String),

    /// An input record could not be decoded into an alert.
    #[error("Failed to decode alert: {0}")]
    Decode(String),

    /// The source no longer accepts alerts.
    #[error("Alert source is closed")]
    Closed,
}

/// An iterator over the alerts of one subscription.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AlertIterator: Send {
    /// Waits for the next alert. Returns `None` once the subscription is
    /// exhausted or closed.
    ///
    /// Implementations must be cancel safe: dropping the future before it
    /// completes must not lose an alert.
    async fn next(&mut self) -> Option<Alert>;

    /// The error encountered by the latest call to `next`, if any.
    fn err(&self) -> Option<SourceError>;

    /// Ends the subscription and releases its resources.
    fn close(&mut self);
}

/// A producer of alerts the dispatcher can subscribe to.
#[cfg_attr(test, automock)]
pub trait AlertSource: Send + Sync {
    /// Opens a new subscription. Implementations may replay alerts known
    /// before the subscription was opened.
    fn subscribe(&self) -> Box<dyn AlertIterator>;
}
