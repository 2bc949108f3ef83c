//! Read-only snapshots of the dispatcher's aggregation groups.

use std::{collections::HashMap, time::Duration};

use serde::Serialize;

use super::{alert::Alert, labels::LabelSet};

/// A snapshot of one aggregation group and its (filtered) alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertGroup {
    /// The member alerts, sorted.
    pub alerts: Vec<Alert>,
    /// The group labels shared by every member.
    pub labels: LabelSet,
    /// The receiver of the route owning the group.
    pub receiver: String,
    /// The group's external correlation key.
    pub group_key: String,
    /// The id of the route owning the group.
    pub route_id: String,
    /// The repeat interval of the route.
    pub renotify: Duration,
}

/// Sorts groups by labels, then receiver.
pub fn sort_groups(groups: &mut [AlertGroup]) {
    groups.sort_by(|a, b| a.labels.cmp(&b.labels).then_with(|| a.receiver.cmp(&b.receiver)));
}

/// Counters describing the dispatcher's registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    /// Total number of active aggregation groups.
    pub total_groups: usize,
    /// Number of routes that currently own at least one group.
    pub routes_with_groups: usize,
    /// Number of groups per route key. Routes sharing a key are summed.
    pub groups_per_route: HashMap<String, usize>,
}
