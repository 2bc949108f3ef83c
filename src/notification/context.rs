//! The per-flush context handed to notification stages.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::LabelSet;

/// Maps a group interval to the time a single notification may take.
pub type NotifyTimeout = Arc<dyn Fn(Duration) -> Duration + Send + Sync>;

/// Returns a [`NotifyTimeout`] granting each notification exactly its group
/// interval, so an attempt never outlives the next scheduled flush.
pub fn group_interval_timeout() -> NotifyTimeout {
    Arc::new(|group_interval| group_interval)
}

/// Returns a [`NotifyTimeout`] granting each notification its group interval,
/// but never less than `min`. A zero `min` is the same as
/// [`group_interval_timeout`].
pub fn min_notify_timeout(min: Duration) -> NotifyTimeout {
    Arc::new(move |group_interval| group_interval.max(min))
}

/// Everything a notification stage knows about the flush it is part of.
#[derive(Debug, Clone)]
pub struct NotifyContext {
    /// The tick time of the flush. Alerts were classified as firing or
    /// resolved against this instant.
    pub now: DateTime<Utc>,
    /// The key of the group being flushed.
    pub group_key: String,
    /// The labels the group was formed on.
    pub group_labels: LabelSet,
    /// The receiver the notification is addressed to.
    pub receiver: String,
    /// How long to wait before sending an unchanged notification again.
    pub repeat_interval: Duration,
    /// Names of time intervals in which the route is muted.
    pub mute_time_intervals: Vec<String>,
    /// Names of time intervals outside of which the route is muted.
    pub active_time_intervals: Vec<String>,
    /// The id of the route the group belongs to.
    pub route_id: String,
    /// The instant by which the notification must complete.
    pub deadline: Instant,
    /// Cancelled when the group is stopped.
    pub cancellation_token: CancellationToken,
}

impl NotifyContext {
    /// Returns true once the group owning this context has been stopped.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Time left until the deadline, zero if it already passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_interval_timeout_is_the_identity() {
        let timeout = group_interval_timeout();
        assert_eq!(timeout(Duration::ZERO), Duration::ZERO);
        assert_eq!(timeout(Duration::from_secs(1)), Duration::from_secs(1));
    }

    #[test]
    fn test_remaining_saturates_at_zero() {
        let mut ctx = crate::test_helpers::notify_context("{}:{}", "team-x");
        assert!(ctx.remaining() > Duration::ZERO);

        ctx.deadline = Instant::now();
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_min_notify_timeout_clamps_short_intervals() {
        let timeout = min_notify_timeout(Duration::from_secs(10));
        assert_eq!(timeout(Duration::ZERO), Duration::from_secs(10));
        assert_eq!(timeout(Duration::from_secs(3)), Duration::from_secs(10));
        assert_eq!(timeout(Duration::from_secs(300)), Duration::from_secs(300));
    }
}
