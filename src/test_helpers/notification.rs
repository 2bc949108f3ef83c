//! Notification doubles for testing.

use std::{
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    models::{Alert, LabelSet},
    notification::{NotificationError, NotificationStage, NotifyContext},
};

/// Creates a `NotifyContext` for a flush of `group_key` happening now.
pub fn notify_context(group_key: &str, receiver: &str) -> NotifyContext {
    NotifyContext {
        now: Utc::now(),
        group_key: group_key.to_string(),
        group_labels: LabelSet::new(),
        receiver: receiver.to_string(),
        repeat_interval: Duration::from_secs(4 * 60 * 60),
        mute_time_intervals: Vec::new(),
        active_time_intervals: Vec::new(),
        route_id: receiver.to_string(),
        deadline: Instant::now() + Duration::from_secs(10),
        cancellation_token: CancellationToken::new(),
    }
}

/// A stage recording every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingStage {
    calls: Mutex<Vec<(NotifyContext, Vec<Alert>)>>,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingStage {
    /// Creates a stage that accepts every notification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stage that sleeps for `delay` before accepting a
    /// notification.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    /// Makes subsequent notifications fail or succeed.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every received notification with its context.
    pub fn calls(&self) -> Vec<(NotifyContext, Vec<Alert>)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The alert batches received so far.
    pub fn batches(&self) -> Vec<Vec<Alert>> {
        self.calls().into_iter().map(|(_, alerts)| alerts).collect()
    }

    /// The number of notifications received so far.
    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no notification was received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationStage for RecordingStage {
    async fn exec(&self, ctx: &NotifyContext, alerts: &[Alert]) -> Result<(), NotificationError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((ctx.clone(), alerts.to_vec()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::NotifyFailed("recording stage set to fail".into()));
        }
        Ok(())
    }
}
