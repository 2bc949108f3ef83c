//! The dispatching engine: routing, aggregation groups and their
//! maintenance.
//!
//! The [`Dispatcher`] reads alerts from an alert source, matches them
//! against the [`RoutingTree`] and inserts them into one
//! [`AggregationGroup`] per route and group labels. Every group runs its own
//! flush loop on a spawned task, and a periodic maintenance pass reclaims
//! groups whose alerts have all been resolved and delivered.

pub mod aggregation_group;
pub mod dispatcher;
pub mod limits;
pub mod metrics;
pub mod notification_config;
pub mod routing;

pub use aggregation_group::{AggregationGroup, NotifyFn};
pub use dispatcher::{Dispatcher, stage_notify};
pub use limits::{Limits, StaticLimits, UnlimitedLimits};
pub use metrics::DispatcherMetrics;
pub use notification_config::{
    NotificationConfig, NotificationConfigError, NotificationConfigProvider, RouteDefaults,
    StaticNotificationConfigs,
};
pub use routing::{RouteConfigError, RouteTree, RoutingTree};
