//! Routes and their per-route grouping options.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use serde::Deserialize;

use super::{
    labels::LabelSet,
    matcher::{Matcher, format_matchers},
};
use crate::config::deserialize_optional_duration_from_seconds;

/// Label value of `group_by` that groups by every label of the alert.
pub const GROUP_BY_ALL: &str = "...";

fn default_group_wait() -> Duration {
    Duration::from_secs(30)
}

fn default_group_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_repeat_interval() -> Duration {
    Duration::from_secs(4 * 60 * 60)
}

/// The grouping and scheduling options of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOpts {
    /// The receiver notifications of this route are sent to.
    pub receiver: String,

    /// The labels alerts are grouped by.
    pub group_by: BTreeSet<String>,

    /// Group by the full label set instead of `group_by`.
    pub group_by_all: bool,

    /// How long to wait before the first flush of a new group.
    pub group_wait: Duration,

    /// How long to wait between subsequent flushes of a group.
    pub group_interval: Duration,

    /// Minimum time between repeat notifications of an unresolved alert.
    pub repeat_interval: Duration,

    /// Named time intervals during which notifications are muted.
    pub mute_time_intervals: Vec<String>,

    /// Named time intervals outside of which notifications are muted.
    pub active_time_intervals: Vec<String>,
}

impl Default for RouteOpts {
    fn default() -> Self {
        Self {
            receiver: String::new(),
            group_by: BTreeSet::new(),
            group_by_all: false,
            group_wait: default_group_wait(),
            group_interval: default_group_interval(),
            repeat_interval: default_repeat_interval(),
            mute_time_intervals: Vec::new(),
            active_time_intervals: Vec::new(),
        }
    }
}

impl RouteOpts {
    /// Projects `labels` onto the labels this route groups by.
    pub fn group_labels(&self, labels: &LabelSet) -> LabelSet {
        labels.project(&self.group_by, self.group_by_all)
    }
}

/// A node of the routing tree.
///
/// The `id` and `key` are derived from the node's position and matchers, so
/// they stay the same when an identical configuration is reloaded.
#[derive(Debug, Clone)]
pub struct Route {
    id: String,
    key: String,

    /// The grouping options of this route.
    pub opts: RouteOpts,

    /// Conditions an alert must satisfy to enter this route.
    pub matchers: Vec<Matcher>,

    /// Keep matching sibling routes after this one matched.
    pub continue_matching: bool,

    /// Child routes, evaluated in order.
    pub routes: Vec<Arc<Route>>,
}

impl Route {
    /// Creates a leaf route with an explicit id and key.
    pub fn new(id: impl Into<String>, key: impl Into<String>, opts: RouteOpts) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            opts,
            matchers: Vec::new(),
            continue_matching: false,
            routes: Vec::new(),
        }
    }

    /// Builds the routing tree rooted at `config`.
    pub fn from_config(config: RouteConfig) -> Arc<Route> {
        Self::build(config, None, 0)
    }

    fn build(config: RouteConfig, parent: Option<&Route>, index: usize) -> Arc<Route> {
        let inherited = parent.map(|p| p.opts.clone()).unwrap_or_default();

        let (group_by, group_by_all) = match config.group_by {
            Some(names) if names.iter().any(|n| n == GROUP_BY_ALL) => (BTreeSet::new(), true),
            Some(names) => (names.into_iter().collect(), false),
            None => (inherited.group_by.clone(), inherited.group_by_all),
        };

        let opts = RouteOpts {
            receiver: config.receiver.unwrap_or(inherited.receiver),
            group_by,
            group_by_all,
            group_wait: config.group_wait.unwrap_or(inherited.group_wait),
            group_interval: config.group_interval.unwrap_or(inherited.group_interval),
            repeat_interval: config.repeat_interval.unwrap_or(inherited.repeat_interval),
            mute_time_intervals: config.mute_time_intervals,
            active_time_intervals: config.active_time_intervals,
        };

        let key = match parent {
            None => format_matchers(&config.matchers),
            Some(p) => format!("{}/{}", p.key, format_matchers(&config.matchers)),
        };
        let id = match parent {
            None => key.clone(),
            Some(_) => format!("{}/{}", key, index),
        };

        let mut route = Route {
            id,
            key,
            opts,
            matchers: config.matchers,
            continue_matching: config.continue_matching,
            routes: Vec::new(),
        };
        route.routes = config
            .routes
            .into_iter()
            .enumerate()
            .map(|(i, child)| Self::build(child, Some(&route), i))
            .collect();

        Arc::new(route)
    }

    /// The stable identifier of this route.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The key of this route, used as a prefix of group keys.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns true if `labels` satisfy every matcher of this route.
    pub fn matches(&self, labels: &LabelSet) -> bool {
        self.matchers.iter().all(|m| m.matches(labels))
    }

    /// Returns the routes matching `labels`, depth first. A child matching
    /// without `continue` stops the evaluation of its later siblings; a route
    /// with no matching child matches itself.
    pub fn match_labels(self: &Arc<Self>, labels: &LabelSet) -> Vec<Arc<Route>> {
        if !self.matches(labels) {
            return Vec::new();
        }

        let mut all = Vec::new();
        for child in &self.routes {
            let matches = child.match_labels(labels);
            let matched = !matches.is_empty();
            all.extend(matches);
            if matched && !child.continue_matching {
                break;
            }
        }

        if all.is_empty() {
            all.push(Arc::clone(self));
        }
        all
    }

    /// Visits this route and all of its descendants, depth first.
    pub fn walk(self: &Arc<Self>, visit: &mut impl FnMut(&Arc<Route>, usize)) {
        self.walk_at(0, visit);
    }

    fn walk_at(self: &Arc<Self>, depth: usize, visit: &mut impl FnMut(&Arc<Route>, usize)) {
        visit(self, depth);
        for child in &self.routes {
            child.walk_at(depth + 1, visit);
        }
    }
}

/// The on-disk representation of a route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteConfig {
    /// The receiver; inherited from the parent when unset.
    #[serde(default)]
    pub receiver: Option<String>,

    /// The labels to group by. `...` groups by all labels.
    #[serde(default)]
    pub group_by: Option<Vec<String>>,

    /// Matcher expressions such as `severity="critical"`.
    #[serde(default)]
    pub matchers: Vec<Matcher>,

    /// Keep matching sibling routes after this one matched.
    #[serde(default, rename = "continue")]
    pub continue_matching: bool,

    /// Seconds before the first flush of a new group.
    #[serde(default, deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub group_wait: Option<Duration>,

    /// Seconds between flushes of a group.
    #[serde(default, deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub group_interval: Option<Duration>,

    /// Seconds between repeat notifications.
    #[serde(default, deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub repeat_interval: Option<Duration>,

    /// Named mute time intervals.
    #[serde(default)]
    pub mute_time_intervals: Vec<String>,

    /// Named active time intervals.
    #[serde(default)]
    pub active_time_intervals: Vec<String>,

    /// Child routes.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Arc<Route> {
        let config = RouteConfig {
            receiver: Some("default".into()),
            group_by: Some(vec!["alertname".into()]),
            group_wait: Some(Duration::from_secs(10)),
            routes: vec![
                RouteConfig {
                    receiver: Some("pager".into()),
                    matchers: vec!["severity=critical".parse().unwrap()],
                    continue_matching: true,
                    ..Default::default()
                },
                RouteConfig {
                    receiver: Some("team-api".into()),
                    group_by: Some(vec![GROUP_BY_ALL.into()]),
                    matchers: vec!["service=~api|gateway".parse().unwrap()],
                    ..Default::default()
                },
                RouteConfig {
                    receiver: Some("team-other".into()),
                    matchers: vec!["service=~.+".parse().unwrap()],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        Route::from_config(config)
    }

    fn receivers(routes: &[Arc<Route>]) -> Vec<&str> {
        routes.iter().map(|r| r.opts.receiver.as_str()).collect()
    }

    #[test]
    fn test_children_inherit_parent_options() {
        let root = tree();
        let pager = &root.routes[0];
        assert_eq!(pager.opts.group_wait, Duration::from_secs(10));
        assert_eq!(pager.opts.group_interval, default_group_interval());
        assert!(pager.opts.group_by.contains("alertname"));

        let api = &root.routes[1];
        assert!(api.opts.group_by_all);
    }

    #[test]
    fn test_ids_and_keys_are_derived_from_position() {
        let root = tree();
        assert_eq!(root.key(), "{}");
        assert_eq!(root.id(), "{}");
        assert_eq!(root.routes[0].key(), r#"{}/{severity="critical"}"#);
        assert_eq!(root.routes[0].id(), r#"{}/{severity="critical"}/0"#);
        assert_eq!(root.routes[2].id(), r#"{}/{service=~".+"}/2"#);

        let reloaded = tree();
        assert_eq!(reloaded.routes[1].id(), root.routes[1].id());
    }

    #[test]
    fn test_match_labels_honours_continue() {
        let root = tree();

        let critical_api = LabelSet::from([("severity", "critical"), ("service", "api")]);
        assert_eq!(receivers(&root.match_labels(&critical_api)), vec!["pager", "team-api"]);

        let api = LabelSet::from([("service", "gateway")]);
        assert_eq!(receivers(&root.match_labels(&api)), vec!["team-api"]);

        let unrouted = LabelSet::from([("alertname", "Foo")]);
        assert_eq!(receivers(&root.match_labels(&unrouted)), vec!["default"]);
    }

    #[test]
    fn test_group_labels_projection() {
        let root = tree();
        let labels = LabelSet::from([("alertname", "Foo"), ("instance", "a")]);
        assert_eq!(root.opts.group_labels(&labels), LabelSet::from([("alertname", "Foo")]));
        assert_eq!(root.routes[1].opts.group_labels(&labels), labels);
    }
}
