//! The dispatcher sorts incoming alerts into aggregation groups and hands
//! every flushed group to the notification pipeline.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::{
    sync::RwLock,
    time::{Instant, MissedTickBehavior, interval_at, timeout_at},
};
use tokio_util::sync::CancellationToken;

use super::{
    aggregation_group::{AggregationGroup, NotifyFn},
    limits::{Limits, UnlimitedLimits},
    metrics::DispatcherMetrics,
    notification_config::{
        NotificationConfigProvider, RULE_ID_LABEL, RouteDefaults, resolve_grouping,
    },
    routing::RoutingTree,
};
use crate::{
    models::{
        Alert, AlertGroup, DispatcherStats, Fingerprint, Route, alert::sort_alerts,
        alert_group::sort_groups,
    },
    notification::{
        NotificationError, NotificationStage, NotifyContext, NotifyTimeout,
        group_interval_timeout,
    },
    persistence::{MemoryAlertBuffer, traits::GroupMarker},
    providers::traits::{AlertIterator, AlertSource},
};

/// The default period between two maintenance passes.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// The groups of one route.
struct RouteGroups {
    route: Arc<Route>,
    groups: HashMap<Fingerprint, Arc<AggregationGroup>>,
}

#[derive(Default)]
struct Registry {
    routes: HashMap<String, RouteGroups>,
    count: usize,
}

#[derive(Default)]
struct Lifecycle {
    /// Set while `run` is active, taken by the first `stop`.
    cancel: Option<CancellationToken>,
    /// Cancelled once `run` has returned.
    done: Option<CancellationToken>,
}

/// Sorts alerts into aggregation groups keyed by route id and group labels,
/// and reclaims groups that ran empty.
pub struct Dispatcher {
    source: Arc<dyn AlertSource>,
    routes: Arc<dyn RoutingTree>,
    marker: Arc<dyn GroupMarker>,
    limits: Arc<dyn Limits>,
    notification_configs: Arc<dyn NotificationConfigProvider>,
    metrics: DispatcherMetrics,
    timeout: NotifyTimeout,
    maintenance_interval: Duration,
    notify: NotifyFn,

    registry: RwLock<Registry>,
    cancellation_token: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl Dispatcher {
    /// Creates a dispatcher reading alerts from `source`, routing them
    /// through `routes` and notifying through `stage`.
    pub fn new(
        source: Arc<dyn AlertSource>,
        routes: Arc<dyn RoutingTree>,
        stage: Arc<dyn NotificationStage>,
        marker: Arc<dyn GroupMarker>,
        metrics: DispatcherMetrics,
    ) -> Self {
        Self {
            source,
            routes,
            marker,
            limits: Arc::new(UnlimitedLimits),
            notification_configs: Arc::new(RouteDefaults),
            metrics,
            timeout: group_interval_timeout(),
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
            notify: stage_notify(stage),
            registry: RwLock::new(Registry::default()),
            cancellation_token: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Caps the number of aggregation groups.
    pub fn with_limits(mut self, limits: Arc<dyn Limits>) -> Self {
        self.limits = limits;
        self
    }

    /// Looks up per-rule grouping and renotify settings in `configs`.
    pub fn with_notification_configs(mut self, configs: Arc<dyn NotificationConfigProvider>) -> Self {
        self.notification_configs = configs;
        self
    }

    /// Replaces the function deriving a notification's timeout from the
    /// group interval. Defaults to the group interval itself.
    pub fn with_notify_timeout(mut self, timeout: NotifyTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the period between two maintenance passes.
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Ties the dispatcher to `parent`: cancelling it stops the run loop and
    /// every group.
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.cancellation_token = parent.child_token();
        self
    }

    /// Subscribes to the alert source and dispatches alerts until the
    /// subscription ends or the dispatcher is stopped.
    ///
    /// On return, every remaining group has been stopped and the
    /// subscription is closed.
    pub async fn run(&self) {
        let done = CancellationToken::new();
        {
            let mut lifecycle = self.lifecycle();
            lifecycle.cancel = Some(self.cancellation_token.clone());
            lifecycle.done = Some(done.clone());
        }

        tracing::info!(maintenance_interval = ?self.maintenance_interval, "Dispatcher started.");
        self.run_loop(self.source.subscribe()).await;
        self.stop_all_groups().await;
        tracing::info!("Dispatcher stopped.");

        done.cancel();
    }

    async fn run_loop(&self, mut it: Box<dyn AlertIterator>) {
        // `interval_at` panics on a zero period.
        let period = self.maintenance_interval.max(Duration::from_millis(100));
        let mut maintenance = interval_at(Instant::now() + period, period);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => break,

                _ = maintenance.tick() => self.do_maintenance().await,

                alert = it.next() => {
                    let Some(alert) = alert else {
                        if let Some(e) = it.err() {
                            tracing::error!(error = %e, "Alert subscription ended with an error.");
                        }
                        tracing::info!("Alert subscription exhausted.");
                        break;
                    };

                    if let Some(e) = it.err() {
                        tracing::error!(error = %e, "Error on alert update.");
                    }
                    tracing::debug!(alert = alert.name(), fingerprint = %alert.fingerprint(), "Received alert.");
                    self.ingest(alert).await;
                }
            }
        }

        it.close();
    }

    async fn ingest(&self, alert: Alert) {
        let started = Instant::now();
        for route in self.routes.match_routes(&alert.labels) {
            self.process_alert(alert.clone(), &route).await;
        }
        self.metrics.processing_duration.observe(started.elapsed().as_secs_f64());
    }

    /// Inserts `alert` into its group under `route`, creating the group if
    /// the limits allow it.
    ///
    /// The group labels and repeat interval come from the notification config
    /// of the alert's rule, falling back to the route's options. Alerts whose
    /// config cannot be looked up are dropped.
    pub async fn process_alert(&self, alert: Alert, route: &Arc<Route>) {
        let rule_id = alert.labels.get(RULE_ID_LABEL).unwrap_or_default();
        let config = match self.notification_configs.notification_config(rule_id) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(rule_id, alert = alert.name(), error = %e, "Failed to get notification config, dropping alert.");
                return;
            }
        };
        let (group_labels, repeat_interval) = resolve_grouping(config.as_ref(), &alert, &route.opts);
        let fingerprint = group_labels.fingerprint();

        let mut registry = self.registry.write().await;
        let registry = &mut *registry;

        if let Some(route_groups) = registry.routes.get_mut(route.id()) {
            route_groups.route = Arc::clone(route);
            if let Some(group) = route_groups.groups.get(&fingerprint) {
                group.insert(alert);
                return;
            }
        }

        let limit = self.limits.max_number_of_aggregation_groups();
        if limit > 0 && registry.count >= limit {
            self.metrics.aggregation_group_limit_reached.inc();
            tracing::error!(
                groups = registry.count,
                limit,
                alert = alert.name(),
                "Too many aggregation groups, cannot create new group for alert."
            );
            return;
        }

        let group = Arc::new(
            AggregationGroup::new(
                route,
                group_labels,
                Arc::new(MemoryAlertBuffer::new()),
                Arc::clone(&self.timeout),
                &self.cancellation_token,
            )
            .with_repeat_interval(repeat_interval),
        );
        registry
            .routes
            .entry(route.id().to_string())
            .or_insert_with(|| RouteGroups { route: Arc::clone(route), groups: HashMap::new() })
            .groups
            .insert(fingerprint, Arc::clone(&group));
        registry.count += 1;
        self.metrics.aggregation_groups.inc();
        tracing::debug!(route_id = %route.id(), group_key = %group.group_key(), "Created aggregation group.");

        // The first alert goes in before the loop starts so the first flush
        // is never empty.
        group.insert(alert);
        group.spawn(Arc::clone(&self.notify));
    }

    /// Stops and removes every group whose buffer is empty.
    pub async fn do_maintenance(&self) {
        let reclaimed = {
            let mut registry = self.registry.write().await;
            let mut reclaimed = Vec::new();
            for route_groups in registry.routes.values_mut() {
                route_groups.groups.retain(|_, group| {
                    if group.is_empty() {
                        reclaimed.push(Arc::clone(group));
                        return false;
                    }
                    true
                });
            }
            registry.routes.retain(|_, route_groups| !route_groups.groups.is_empty());
            registry.count -= reclaimed.len();
            reclaimed
        };

        for group in &reclaimed {
            group.stop().await;
            self.marker.delete_by_group_key(group.route_id(), group.group_key());
            self.metrics.aggregation_groups.dec();
        }

        if !reclaimed.is_empty() {
            tracing::debug!(reclaimed = reclaimed.len(), "Reclaimed empty aggregation groups.");
        }
    }

    async fn stop_all_groups(&self) {
        let groups: Vec<Arc<AggregationGroup>> = {
            let mut registry = self.registry.write().await;
            registry.count = 0;
            registry.routes.drain().flat_map(|(_, route_groups)| route_groups.groups.into_values()).collect()
        };

        for group in &groups {
            group.stop().await;
        }
        self.metrics.aggregation_groups.set(0);
        tracing::debug!(stopped = groups.len(), "Stopped remaining aggregation groups.");
    }

    /// Returns a snapshot of the groups whose route passes `route_filter`,
    /// holding only the alerts passing `alert_filter`.
    ///
    /// Groups left without alerts are omitted. Groups are sorted by labels,
    /// then receiver, and their alerts are sorted as well. The second value
    /// maps every returned alert's fingerprint to the sorted receivers it was
    /// routed to.
    pub async fn groups<R, A>(
        &self,
        route_filter: R,
        alert_filter: A,
    ) -> (Vec<AlertGroup>, HashMap<Fingerprint, Vec<String>>)
    where
        R: Fn(&Route) -> bool,
        A: Fn(&Alert, DateTime<Utc>) -> bool,
    {
        let snapshot: Vec<(Arc<Route>, Vec<Arc<AggregationGroup>>)> = {
            let registry = self.registry.read().await;
            registry
                .routes
                .values()
                .filter(|route_groups| route_filter(route_groups.route.as_ref()))
                .map(|route_groups| {
                    (Arc::clone(&route_groups.route), route_groups.groups.values().cloned().collect())
                })
                .collect()
        };

        let now = Utc::now();
        let mut groups = Vec::new();
        let mut receivers: HashMap<Fingerprint, Vec<String>> = HashMap::new();

        for (route, route_groups) in snapshot {
            let receiver = &route.opts.receiver;
            for group in route_groups {
                let mut alerts: Vec<Alert> =
                    group.alerts().into_iter().filter(|alert| alert_filter(alert, now)).collect();
                if alerts.is_empty() {
                    continue;
                }

                for alert in &alerts {
                    receivers.entry(alert.fingerprint()).or_default().push(receiver.clone());
                }
                sort_alerts(&mut alerts);

                groups.push(AlertGroup {
                    alerts,
                    labels: group.labels().clone(),
                    receiver: receiver.clone(),
                    group_key: group.group_key().to_string(),
                    route_id: group.route_id().to_string(),
                    renotify: group.opts().repeat_interval,
                });
            }
        }

        sort_groups(&mut groups);
        for names in receivers.values_mut() {
            names.sort();
        }

        (groups, receivers)
    }

    /// Counts the active groups, overall and per route key.
    pub async fn stats(&self) -> DispatcherStats {
        let registry = self.registry.read().await;
        let mut routes_with_groups = 0;
        let mut groups_per_route: HashMap<String, usize> = HashMap::new();
        for route_groups in registry.routes.values().filter(|route_groups| !route_groups.groups.is_empty()) {
            routes_with_groups += 1;
            *groups_per_route.entry(route_groups.route.key().to_string()).or_default() +=
                route_groups.groups.len();
        }

        DispatcherStats {
            total_groups: registry.count,
            routes_with_groups,
            groups_per_route,
        }
    }

    /// Stops the run loop and waits until it has returned.
    ///
    /// Only the first call after `run` started has an effect; calling it
    /// before `run` or a second time returns immediately.
    pub async fn stop(&self) {
        let (cancel, done) = {
            let mut lifecycle = self.lifecycle();
            (lifecycle.cancel.take(), lifecycle.done.clone())
        };
        let Some(cancel) = cancel else {
            return;
        };

        cancel.cancel();
        if let Some(done) = done {
            done.cancelled().await;
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wraps `stage` into the callback invoked by every group flush.
///
/// The stage is abandoned when the flush context is cancelled or its deadline
/// passes. Cancellation is expected on shutdown and is only logged at debug
/// level.
pub fn stage_notify(stage: Arc<dyn NotificationStage>) -> NotifyFn {
    Arc::new(move |ctx, alerts| {
        let stage = Arc::clone(&stage);
        async move { notify_stage(stage.as_ref(), &ctx, &alerts).await }.boxed()
    })
}

async fn notify_stage(stage: &dyn NotificationStage, ctx: &NotifyContext, alerts: &[Alert]) -> bool {
    match exec_stage(stage, ctx, alerts).await {
        Ok(()) => true,
        Err(e) if e.is_cancelled() => {
            tracing::debug!(group_key = %ctx.group_key, num_alerts = alerts.len(), error = %e, "Notify for alerts failed.");
            false
        }
        Err(e) => {
            tracing::error!(group_key = %ctx.group_key, num_alerts = alerts.len(), error = %e, "Notify for alerts failed.");
            false
        }
    }
}

async fn exec_stage(
    stage: &dyn NotificationStage,
    ctx: &NotifyContext,
    alerts: &[Alert],
) -> Result<(), NotificationError> {
    tokio::select! {
        biased;

        _ = ctx.cancellation_token.cancelled() => Err(NotificationError::Cancelled),

        result = timeout_at(ctx.deadline, stage.exec(ctx, alerts)) => {
            result.unwrap_or(Err(NotificationError::DeadlineExceeded))
        }
    }
}
