//! An in-memory alert source with fan-out to every subscriber.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;

use super::traits::{AlertIterator, AlertSource, SourceError};
use crate::models::{Alert, Fingerprint};

/// How long resolved alerts are kept by default.
pub const DEFAULT_ALERT_RETENTION: Duration = Duration::from_secs(120 * 60 * 60);

struct Inner {
    /// The latest version of every alert, replayed to new subscribers.
    alerts: HashMap<Fingerprint, Alert>,
    /// `None` once the source is shut down.
    tx: Option<broadcast::Sender<Alert>>,
}

/// Keeps the latest version of each alert and streams updates to all
/// subscribers.
///
/// A new subscriber first receives every known alert, then every alert put
/// after it subscribed. Alerts resolved for longer than the retention are
/// dropped by [`gc`](Self::gc).
pub struct MemoryAlertSource {
    inner: Mutex<Inner>,
    retention: Duration,
}

impl MemoryAlertSource {
    /// Creates a source whose subscribers can fall `capacity` alerts behind
    /// before they start lagging.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Mutex::new(Inner { alerts: HashMap::new(), tx: Some(tx) }),
            retention: DEFAULT_ALERT_RETENTION,
        }
    }

    /// Sets how long resolved alerts are kept.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Drops every alert resolved for longer than the retention and returns
    /// how many were dropped.
    pub fn gc(&self) -> usize {
        let Some(cutoff) = TimeDelta::from_std(self.retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return 0;
        };
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };

        let before = inner.alerts.len();
        inner.alerts.retain(|_, alert| !alert.resolved_at(cutoff));
        before - inner.alerts.len()
    }

    /// Runs [`gc`](Self::gc) every `interval` until `token` is cancelled.
    pub async fn run_gc(&self, interval: Duration, token: CancellationToken) {
        // `interval_at` panics on a zero period.
        let period = interval.max(Duration::from_millis(100));
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,

                _ = ticks.tick() => {
                    let dropped = self.gc();
                    if dropped > 0 {
                        tracing::debug!(dropped, retention = ?self.retention, "Dropped expired alerts.");
                    }
                }
            }
        }
    }

    /// Stores the alerts and sends them to every subscriber.
    pub fn put(&self, alerts: impl IntoIterator<Item = Alert>) -> Result<(), SourceError> {
        let mut inner = self.inner.lock().map_err(|_| SourceError::Closed)?;
        let tx = inner.tx.clone().ok_or(SourceError::Closed)?;
        for alert in alerts {
            inner.alerts.insert(alert.fingerprint(), alert.clone());
            // Sending fails only without subscribers; they get the replay.
            let _ = tx.send(alert);
        }
        Ok(())
    }

    /// Returns the number of alerts currently known to the source.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.alerts.len()).unwrap_or_default()
    }

    /// Returns true if the source holds no alerts.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops accepting alerts. Existing subscriptions end once they have
    /// drained what was already sent.
    pub fn shutdown(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.tx = None;
        }
    }
}

impl AlertSource for MemoryAlertSource {
    fn subscribe(&self) -> Box<dyn AlertIterator> {
        let Ok(inner) = self.inner.lock() else {
            return Box::new(MemoryAlertIterator::closed(SourceError::Closed));
        };
        let pending: VecDeque<Alert> = inner.alerts.values().cloned().collect();
        let rx = inner.tx.as_ref().map(broadcast::Sender::subscribe);
        Box::new(MemoryAlertIterator { pending, rx, err: None })
    }
}

/// A subscription to a [`MemoryAlertSource`].
pub struct MemoryAlertIterator {
    pending: VecDeque<Alert>,
    rx: Option<broadcast::Receiver<Alert>>,
    err: Option<SourceError>,
}

impl MemoryAlertIterator {
    fn closed(err: SourceError) -> Self {
        Self { pending: VecDeque::new(), rx: None, err: Some(err) }
    }
}

#[async_trait]
impl AlertIterator for MemoryAlertIterator {
    async fn next(&mut self) -> Option<Alert> {
        if let Some(alert) = self.pending.pop_front() {
            self.err = None;
            return Some(alert);
        }

        let rx = self.rx.as_mut()?;
        self.err = None;
        loop {
            match rx.recv().await {
                Ok(alert) => return Some(alert),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Alert subscriber lagged behind.");
                    self.err = Some(SourceError::Lagged(skipped));
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    fn err(&self) -> Option<SourceError> {
        self.err.clone()
    }

    fn close(&mut self) {
        self.pending.clear();
        self.rx = None;
    }
}
