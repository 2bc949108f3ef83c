//! This module provides the `SupervisorBuilder` for constructing a `Supervisor`.

use std::sync::Arc;

use prometheus::Registry;
use tokio::io::AsyncBufRead;
use tokio_util::sync::CancellationToken;

use super::{AlertInput, Supervisor, SupervisorError};
use crate::{
    config::AppConfig,
    engine::{
        Dispatcher, DispatcherMetrics, NotificationConfigProvider, RoutingTree, StaticLimits,
    },
    notification::{NotificationStage, min_notify_timeout},
    persistence::{MemoryGroupMarker, traits::GroupMarker},
    providers::{MemoryAlertSource, traits::AlertSource},
};

/// A builder for creating a `Supervisor` instance.
#[derive(Default)]
pub struct SupervisorBuilder {
    config: Option<AppConfig>,
    source: Option<Arc<dyn AlertSource>>,
    input: Option<AlertInput>,
    routes: Option<Arc<dyn RoutingTree>>,
    stage: Option<Arc<dyn NotificationStage>>,
    marker: Option<Arc<dyn GroupMarker>>,
    notification_configs: Option<Arc<dyn NotificationConfigProvider>>,
    registry: Option<Registry>,
}

impl SupervisorBuilder {
    /// Creates a new, empty `SupervisorBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application configuration for the `Supervisor`.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the alert source the dispatcher subscribes to.
    pub fn source(mut self, source: Arc<dyn AlertSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Reads JSON encoded alerts, one per line, into an in-memory alert
    /// source. Ignored if an alert source is set.
    pub fn input(mut self, input: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    /// Sets the routing tree alerts are matched against.
    pub fn routes(mut self, routes: Arc<dyn RoutingTree>) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Sets the notification stage flushed groups are sent to.
    pub fn stage(mut self, stage: Arc<dyn NotificationStage>) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Sets the group marker. Defaults to a [`MemoryGroupMarker`].
    pub fn marker(mut self, marker: Arc<dyn GroupMarker>) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Sets the per-rule notification configs. By default every alert is
    /// grouped by its route's options.
    pub fn notification_configs(mut self, configs: Arc<dyn NotificationConfigProvider>) -> Self {
        self.notification_configs = Some(configs);
        self
    }

    /// Registers the dispatcher metrics into `registry`.
    pub fn metrics_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Assembles and validates the components to build a `Supervisor`.
    pub fn build(self) -> Result<Supervisor, SupervisorError> {
        let config = self.config.ok_or(SupervisorError::MissingConfig)?;
        let routes = self.routes.ok_or(SupervisorError::MissingRoutingTree)?;
        let stage = self.stage.ok_or(SupervisorError::MissingNotificationStage)?;
        let marker = self.marker.unwrap_or_else(|| Arc::new(MemoryGroupMarker::new()));

        let (source, input) = match (self.source, self.input) {
            (Some(source), _) => (source, None),
            (None, Some(input)) => {
                let memory = Arc::new(
                    MemoryAlertSource::new(config.alert_channel_capacity)
                        .with_retention(config.alert_retention),
                );
                (Arc::clone(&memory) as Arc<dyn AlertSource>, Some((input, memory)))
            }
            (None, None) => return Err(SupervisorError::MissingAlertSource),
        };

        let metrics = match &self.registry {
            Some(registry) => DispatcherMetrics::registered(registry)?,
            None => DispatcherMetrics::new()?,
        };

        let cancellation_token = CancellationToken::new();
        let mut dispatcher = Dispatcher::new(source, routes, stage, marker, metrics)
            .with_limits(Arc::new(StaticLimits(config.max_aggregation_groups)))
            .with_notify_timeout(min_notify_timeout(config.min_notify_timeout))
            .with_maintenance_interval(config.maintenance_interval)
            .with_parent_token(&cancellation_token);
        if let Some(configs) = self.notification_configs {
            dispatcher = dispatcher.with_notification_configs(configs);
        }

        tracing::debug!(
            max_aggregation_groups = config.max_aggregation_groups,
            maintenance_interval = ?config.maintenance_interval,
            "Dispatcher configured."
        );

        Ok(Supervisor::new(config, Arc::new(dispatcher), input, cancellation_token))
    }
}
