use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::{context::NotifyContext, error::NotificationError};
use crate::models::Alert;

/// A stage of the notification pipeline receiving the alerts of a flushed
/// group.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationStage: Send + Sync {
    /// Delivers `alerts` for the group described by `ctx`.
    ///
    /// Implementations should return [`NotificationError::Cancelled`] when
    /// `ctx` is cancelled while they are still working.
    async fn exec(&self, ctx: &NotifyContext, alerts: &[Alert]) -> Result<(), NotificationError>;
}
