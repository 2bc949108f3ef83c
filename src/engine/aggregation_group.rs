//! A set of alerts sharing a route and group labels, flushed together on a
//! shared schedule.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::BoxFuture;
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;

use crate::{
    models::{Alert, Fingerprint, LabelSet, Route, RouteOpts, alert::sort_alerts},
    notification::{NotifyContext, NotifyTimeout},
    persistence::traits::AlertBuffer,
};

/// Sends one flushed batch down the notification pipeline. Resolves to
/// `false` if the notification failed.
pub type NotifyFn = Arc<dyn Fn(NotifyContext, Vec<Alert>) -> BoxFuture<'static, bool> + Send + Sync>;

#[derive(Debug)]
struct Timer {
    /// The single pending flush deadline.
    next: Instant,
    has_flushed: bool,
}

/// Aggregates alerts into a group flushed after `group_wait`, then every
/// `group_interval` until stopped.
pub struct AggregationGroup {
    labels: LabelSet,
    fingerprint: Fingerprint,
    route_id: String,
    group_key: String,
    opts: RouteOpts,

    buffer: Arc<dyn AlertBuffer>,
    timeout: NotifyTimeout,

    timer: Mutex<Timer>,
    rearmed: Notify,
    cancellation_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AggregationGroup {
    /// Creates a group for the alerts of `route` that project onto `labels`.
    ///
    /// The group is cancelled together with `parent`. Its first flush is due
    /// `group_wait` after creation.
    pub fn new(
        route: &Route,
        labels: LabelSet,
        buffer: Arc<dyn AlertBuffer>,
        timeout: NotifyTimeout,
        parent: &CancellationToken,
    ) -> Self {
        let opts = route.opts.clone();
        let timer = Timer { next: Instant::now() + opts.group_wait, has_flushed: false };

        Self {
            fingerprint: labels.fingerprint(),
            group_key: format!("{}:{}", route.key(), labels),
            route_id: route.id().to_string(),
            labels,
            opts,
            buffer,
            timeout,
            timer: Mutex::new(timer),
            rearmed: Notify::new(),
            cancellation_token: parent.child_token(),
            handle: Mutex::new(None),
        }
    }

    /// Renotifies the group's alerts every `repeat_interval` instead of the
    /// route's repeat interval.
    pub fn with_repeat_interval(mut self, repeat_interval: Duration) -> Self {
        self.opts.repeat_interval = repeat_interval;
        self
    }

    /// The fingerprint of the group labels, unique among the groups of a
    /// route.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// The external correlation key of the group: the route key followed by
    /// the group labels.
    pub fn group_key(&self) -> &str {
        &self.group_key
    }

    /// The labels shared by every alert of the group.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// The id of the route owning the group.
    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    /// The routing options the group was created with.
    pub fn opts(&self) -> &RouteOpts {
        &self.opts
    }

    /// The alerts currently buffered.
    pub fn alerts(&self) -> Vec<Alert> {
        self.buffer.list().into_iter().map(|snapshot| snapshot.alert).collect()
    }

    /// Returns true if no alert is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns true once the group's first flush has fired.
    pub fn has_flushed(&self) -> bool {
        self.timer().has_flushed
    }

    /// Adds or replaces an alert.
    ///
    /// Before the first flush, an alert that started more than `group_wait`
    /// ago makes the group flush immediately.
    pub fn insert(&self, alert: Alert) {
        let starts_at = alert.starts_at;
        if let Err(e) = self.buffer.set(alert) {
            tracing::error!(group_key = %self.group_key, error = %e, "Failed to buffer alert.");
        }

        let mut timer = self.timer();
        if !timer.has_flushed && self.wait_elapsed(starts_at) {
            timer.next = Instant::now();
            drop(timer);
            self.rearmed.notify_one();
        }
    }

    fn wait_elapsed(&self, starts_at: DateTime<Utc>) -> bool {
        TimeDelta::from_std(self.opts.group_wait)
            .ok()
            .and_then(|wait| starts_at.checked_add_signed(wait))
            .is_some_and(|ready_at| ready_at < Utc::now())
    }

    /// Starts the flush loop on a new task. The loop runs until
    /// [`stop`](Self::stop) is called or the parent token is cancelled.
    pub fn spawn(self: &Arc<Self>, notify: NotifyFn) {
        let handle = tokio::spawn(Arc::clone(self).run(notify));
        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    async fn run(self: Arc<Self>, notify: NotifyFn) {
        loop {
            let deadline = self.timer().next;

            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => break,

                _ = self.rearmed.notified() => continue,

                _ = sleep_until(deadline) => {
                    let now = Utc::now();
                    let ctx = self.notify_context(now);
                    let flush_token = ctx.cancellation_token.clone();

                    {
                        let mut timer = self.timer();
                        timer.next = Instant::now() + self.opts.group_interval;
                        timer.has_flushed = true;
                    }

                    self.flush(now, |alerts| notify(ctx, alerts)).await;
                    flush_token.cancel();
                }
            }
        }

        tracing::debug!(group_key = %self.group_key, "Aggregation group stopped.");
    }

    fn notify_context(&self, now: DateTime<Utc>) -> NotifyContext {
        NotifyContext {
            now,
            group_key: self.group_key.clone(),
            group_labels: self.labels.clone(),
            receiver: self.opts.receiver.clone(),
            repeat_interval: self.opts.repeat_interval,
            mute_time_intervals: self.opts.mute_time_intervals.clone(),
            active_time_intervals: self.opts.active_time_intervals.clone(),
            route_id: self.route_id.clone(),
            deadline: Instant::now() + (self.timeout)(self.opts.group_interval),
            cancellation_token: self.cancellation_token.child_token(),
        }
    }

    /// Sends the buffered alerts through `send`, classified against `now`.
    ///
    /// Alerts resolved at `now` keep their end time, firing alerts are sent
    /// without one. When `send` succeeds the resolved alerts are deleted,
    /// unless they changed while the notification was in flight. When it
    /// fails the buffer is left untouched.
    pub async fn flush<F, Fut>(&self, now: DateTime<Utc>, send: F)
    where
        F: FnOnce(Vec<Alert>) -> Fut,
        Fut: Future<Output = bool>,
    {
        if self.is_empty() {
            return;
        }

        let snapshots = self.buffer.list();
        let mut alerts = Vec::with_capacity(snapshots.len());
        let mut resolved = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let mut alert = snapshot.alert.clone();
            if alert.resolved_at(now) {
                resolved.push(snapshot);
            } else {
                alert.ends_at = None;
            }
            alerts.push(alert);
        }
        sort_alerts(&mut alerts);

        tracing::debug!(
            group_key = %self.group_key,
            num_alerts = alerts.len(),
            num_resolved = resolved.len(),
            "Flushing aggregation group."
        );

        if send(alerts).await
            && let Err(e) = self.buffer.delete_if_not_modified(&resolved)
        {
            tracing::error!(group_key = %self.group_key, error = %e, "Failed to delete resolved alerts.");
        }
    }

    /// Cancels the flush loop, including an in-flight notification, and
    /// waits for it to exit. Safe to call on a group that was never spawned.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();

        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!(group_key = %self.group_key, error = %e, "Aggregation group task failed.");
        }
    }

    fn timer(&self) -> MutexGuard<'_, Timer> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AggregationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationGroup")
            .field("group_key", &self.group_key)
            .field("route_id", &self.route_id)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for AggregationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.group_key)
    }
}
