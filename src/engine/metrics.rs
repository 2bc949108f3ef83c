//! Prometheus instruments of the dispatcher.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};

/// The metrics reported by a [`Dispatcher`](super::dispatcher::Dispatcher).
///
/// Instruments are cheap handles; clones report into the same series.
#[derive(Debug, Clone)]
pub struct DispatcherMetrics {
    /// Number of aggregation groups currently alive.
    pub aggregation_groups: IntGauge,
    /// Time spent matching and inserting one incoming alert.
    pub processing_duration: Histogram,
    /// Number of alerts dropped because the group limit was reached.
    pub aggregation_group_limit_reached: IntCounter,
}

impl DispatcherMetrics {
    /// Creates unregistered instruments.
    pub fn new() -> Result<Self, prometheus::Error> {
        let aggregation_groups = IntGauge::with_opts(Opts::new(
            "herald_dispatcher_aggregation_groups",
            "Number of active aggregation groups",
        ))?;
        let processing_duration = Histogram::with_opts(HistogramOpts::new(
            "herald_dispatcher_alert_processing_duration_seconds",
            "Time spent processing an incoming alert",
        ))?;
        let aggregation_group_limit_reached = IntCounter::with_opts(Opts::new(
            "herald_dispatcher_aggregation_group_limit_reached_total",
            "Number of times the aggregation group limit was reached",
        ))?;

        Ok(Self { aggregation_groups, processing_duration, aggregation_group_limit_reached })
    }

    /// Creates the instruments and registers them into `registry`.
    pub fn registered(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self::new()?;
        registry.register(Box::new(metrics.aggregation_groups.clone()))?;
        registry.register(Box::new(metrics.processing_duration.clone()))?;
        registry.register(Box::new(metrics.aggregation_group_limit_reached.clone()))?;
        Ok(metrics)
    }
}
