use async_trait::async_trait;
use serde::Serialize;

use super::{context::NotifyContext, error::NotificationError, traits::NotificationStage};
use crate::models::{Alert, LabelSet};

/// The JSON document printed for every notification.
#[derive(Debug, Serialize)]
pub struct NotificationPayload<'a> {
    /// The receiver the notification is addressed to.
    pub receiver: &'a str,
    /// `resolved` if every alert is resolved, `firing` otherwise.
    pub status: &'static str,
    /// The key of the flushed group.
    pub group_key: &'a str,
    /// The labels the group was formed on.
    pub group_labels: &'a LabelSet,
    /// The alerts of the flush, in display order.
    pub alerts: &'a [Alert],
}

impl<'a> NotificationPayload<'a> {
    /// Builds the payload for `alerts` flushed under `ctx`.
    pub fn new(ctx: &'a NotifyContext, alerts: &'a [Alert]) -> Self {
        let resolved = alerts.iter().all(|a| a.resolved_at(ctx.now));
        Self {
            receiver: &ctx.receiver,
            status: if resolved { "resolved" } else { "firing" },
            group_key: &ctx.group_key,
            group_labels: &ctx.group_labels,
            alerts,
        }
    }
}

/// A stage that prints every notification as a JSON line to standard
/// output.
#[derive(Debug, Default)]
pub struct StdoutStage;

impl StdoutStage {
    /// Creates a new `StdoutStage`.
    pub fn new() -> Self {
        Self
    }

    /// Renders the line printed for a notification.
    pub fn render(ctx: &NotifyContext, alerts: &[Alert]) -> Result<String, NotificationError> {
        Ok(serde_json::to_string(&NotificationPayload::new(ctx, alerts))?)
    }
}

#[async_trait]
impl NotificationStage for StdoutStage {
    async fn exec(&self, ctx: &NotifyContext, alerts: &[Alert]) -> Result<(), NotificationError> {
        if ctx.is_cancelled() {
            return Err(NotificationError::Cancelled);
        }
        if ctx.remaining().is_zero() {
            return Err(NotificationError::DeadlineExceeded);
        }
        println!("{}", Self::render(ctx, alerts)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;
    use crate::test_helpers::{AlertBuilder, notify_context};

    #[test]
    fn test_render_firing_notification() {
        let ctx = notify_context("{}:{alertname=\"Foo\"}", "team-x");
        let alerts = vec![AlertBuilder::new("Foo").label("instance", "a").build()];

        let line = StdoutStage::render(&ctx, &alerts).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["receiver"], "team-x");
        assert_eq!(value["status"], "firing");
        assert_eq!(value["group_key"], "{}:{alertname=\"Foo\"}");
        assert_eq!(value["alerts"][0]["labels"]["instance"], "a");
    }

    #[test]
    fn test_render_resolved_notification() {
        let ctx = notify_context("{}:{}", "team-x");
        let alerts = vec![
            AlertBuilder::new("Foo").ends_at(Utc::now() - ChronoDuration::minutes(1)).build(),
        ];

        let line = StdoutStage::render(&ctx, &alerts).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["status"], "resolved");
    }

    #[tokio::test]
    async fn test_exec_respects_cancellation() {
        let ctx = notify_context("{}:{}", "team-x");
        ctx.cancellation_token.cancel();

        let result = StdoutStage::new().exec(&ctx, &[]).await;
        assert_eq!(result, Err(NotificationError::Cancelled));
    }

    #[tokio::test]
    async fn test_exec_refuses_expired_context() {
        let mut ctx = notify_context("{}:{}", "team-x");
        ctx.deadline = tokio::time::Instant::now();

        let result = StdoutStage::new().exec(&ctx, &[]).await;
        assert_eq!(result, Err(NotificationError::DeadlineExceeded));
    }
}
