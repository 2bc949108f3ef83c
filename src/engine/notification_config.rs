//! Per-rule overrides of how alerts are grouped and renotified.
//!
//! Alerts carrying a `ruleId` label can be grouped by labels of their own
//! rule instead of the route's `group_by`, and renotified on their own
//! interval. No-data alerts always form groups of their own.

use std::{collections::BTreeSet, time::Duration};

use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::models::{Alert, LabelSet, RouteOpts, route::GROUP_BY_ALL};

/// The label naming the rule an alert was produced by.
pub const RULE_ID_LABEL: &str = "ruleId";

/// The label set to `"true"` on alerts raised because a rule saw no data.
pub const NO_DATA_LABEL: &str = "nodata";

/// Errors raised while looking up a notification config.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationConfigError {
    /// The backing store could not be queried.
    #[error("Failed to look up notification config: {0}")]
    Lookup(String),
}

/// Grouping and renotification settings of a single rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationConfig {
    /// The labels alerts of the rule are grouped by.
    pub group_by: BTreeSet<String>,
    /// Group by the full label set instead of `group_by`.
    pub group_by_all: bool,
    /// Replaces the route's repeat interval when non-zero.
    pub renotify_interval: Duration,
    /// Repeat interval of no-data alerts when non-zero.
    pub no_data_interval: Duration,
}

impl NotificationConfig {
    /// Creates a config grouping by `group_by`. A `...` entry groups by all
    /// labels.
    pub fn new(group_by: &[&str]) -> Self {
        Self {
            group_by: group_by.iter().map(|name| name.to_string()).collect(),
            group_by_all: group_by.contains(&GROUP_BY_ALL),
            ..Self::default()
        }
    }

    /// Sets the renotify interval.
    pub fn renotify_interval(mut self, interval: Duration) -> Self {
        self.renotify_interval = interval;
        self
    }

    /// Sets the renotify interval of no-data alerts.
    pub fn no_data_interval(mut self, interval: Duration) -> Self {
        self.no_data_interval = interval;
        self
    }
}

/// Looks up the notification config of a rule.
#[cfg_attr(test, automock)]
pub trait NotificationConfigProvider: Send + Sync {
    /// Returns the config of `rule_id`, or `None` to fall back to the route's
    /// options. `rule_id` is empty for alerts without a rule.
    fn notification_config(
        &self,
        rule_id: &str,
    ) -> Result<Option<NotificationConfig>, NotificationConfigError>;
}

/// Groups every alert by its route's options.
#[derive(Debug, Default, Clone, Copy)]
pub struct RouteDefaults;

impl NotificationConfigProvider for RouteDefaults {
    fn notification_config(
        &self,
        _rule_id: &str,
    ) -> Result<Option<NotificationConfig>, NotificationConfigError> {
        Ok(None)
    }
}

/// Notification configs held in memory, keyed by rule id.
#[derive(Debug, Default)]
pub struct StaticNotificationConfigs {
    configs: DashMap<String, NotificationConfig>,
}

impl StaticNotificationConfigs {
    /// Creates an empty set of configs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the config of `rule_id`, replacing any previous one.
    pub fn set(&self, rule_id: impl Into<String>, config: NotificationConfig) {
        self.configs.insert(rule_id.into(), config);
    }

    /// Removes the config of `rule_id`.
    pub fn remove(&self, rule_id: &str) -> Option<NotificationConfig> {
        self.configs.remove(rule_id).map(|(_, config)| config)
    }
}

impl NotificationConfigProvider for StaticNotificationConfigs {
    fn notification_config(
        &self,
        rule_id: &str,
    ) -> Result<Option<NotificationConfig>, NotificationConfigError> {
        Ok(self.configs.get(rule_id).map(|entry| entry.value().clone()))
    }
}

/// Returns true if `alert` was raised because its rule saw no data.
pub fn is_no_data(alert: &Alert) -> bool {
    alert.labels.get(NO_DATA_LABEL) == Some("true")
}

/// Computes the group labels and repeat interval of `alert` under a route
/// with `opts`, applying the rule's `config` if there is one.
pub fn resolve_grouping(
    config: Option<&NotificationConfig>,
    alert: &Alert,
    opts: &RouteOpts,
) -> (LabelSet, Duration) {
    let (mut labels, mut repeat_interval) = match config {
        Some(config) => {
            let labels = alert.labels.project(&config.group_by, config.group_by_all);
            let repeat = if config.renotify_interval.is_zero() {
                opts.repeat_interval
            } else {
                config.renotify_interval
            };
            (labels, repeat)
        }
        None => (opts.group_labels(&alert.labels), opts.repeat_interval),
    };

    if is_no_data(alert) {
        if let Some(config) = config
            && !config.no_data_interval.is_zero()
        {
            repeat_interval = config.no_data_interval;
        }
        labels.insert(NO_DATA_LABEL, "true");
    }

    (labels, repeat_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{AlertBuilder, RouteBuilder};

    fn opts() -> RouteOpts {
        RouteBuilder::new("team-x")
            .group_by(&["alertname"])
            .repeat_interval(Duration::from_secs(3600))
            .build()
            .opts
            .clone()
    }

    #[test]
    fn test_without_config_uses_route_options() {
        let alert = AlertBuilder::new("Foo").label("service", "api").build();

        let (labels, repeat) = resolve_grouping(None, &alert, &opts());
        assert_eq!(labels, LabelSet::from([("alertname", "Foo")]));
        assert_eq!(repeat, Duration::from_secs(3600));
    }

    #[test]
    fn test_rule_config_overrides_grouping_and_renotify() {
        let config =
            NotificationConfig::new(&["service"]).renotify_interval(Duration::from_secs(60));
        let alert = AlertBuilder::new("Foo").label("service", "api").build();

        let (labels, repeat) = resolve_grouping(Some(&config), &alert, &opts());
        assert_eq!(labels, LabelSet::from([("service", "api")]));
        assert_eq!(repeat, Duration::from_secs(60));

        let all = NotificationConfig::new(&["..."]);
        assert!(all.group_by_all);
        let (labels, repeat) = resolve_grouping(Some(&all), &alert, &opts());
        assert_eq!(labels, alert.labels);
        assert_eq!(repeat, Duration::from_secs(3600));
    }

    #[test]
    fn test_no_data_alerts_get_their_own_group() {
        let config = NotificationConfig::new(&["alertname"])
            .renotify_interval(Duration::from_secs(60))
            .no_data_interval(Duration::from_secs(600));
        let alert = AlertBuilder::new("Foo").build();
        let no_data = AlertBuilder::new("Foo").label(NO_DATA_LABEL, "true").build();

        let (labels, _) = resolve_grouping(Some(&config), &alert, &opts());
        let (no_data_labels, repeat) = resolve_grouping(Some(&config), &no_data, &opts());

        assert_ne!(labels.fingerprint(), no_data_labels.fingerprint());
        assert_eq!(no_data_labels.get(NO_DATA_LABEL), Some("true"));
        assert_eq!(repeat, Duration::from_secs(600));

        let (route_labels, repeat) = resolve_grouping(None, &no_data, &opts());
        assert_eq!(route_labels.get(NO_DATA_LABEL), Some("true"));
        assert_eq!(repeat, Duration::from_secs(3600));
    }

    #[test]
    fn test_static_configs() {
        let configs = StaticNotificationConfigs::new();
        configs.set("rule-1", NotificationConfig::new(&["service"]));

        assert!(configs.notification_config("rule-1").unwrap().is_some());
        assert_eq!(configs.notification_config("rule-2").unwrap(), None);
        assert!(configs.remove("rule-1").is_some());
        assert_eq!(configs.notification_config("rule-1").unwrap(), None);
        assert_eq!(RouteDefaults.notification_config("rule-1").unwrap(), None);
    }
}
