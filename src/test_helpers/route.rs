//! A builder for creating `Route` instances for testing.

use std::{sync::Arc, time::Duration};

use crate::models::{Route, RouteOpts};

/// A builder for creating leaf `Route` instances for testing.
#[derive(Debug, Clone)]
pub struct RouteBuilder {
    id: String,
    key: String,
    opts: RouteOpts,
}

impl RouteBuilder {
    /// Creates a route delivering to `receiver`, identified by the receiver
    /// name.
    pub fn new(receiver: &str) -> Self {
        Self {
            id: receiver.to_string(),
            key: "{}".to_string(),
            opts: RouteOpts { receiver: receiver.to_string(), ..Default::default() },
        }
    }

    /// Sets the route id.
    pub fn id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Sets the route key.
    pub fn key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    /// Sets the labels alerts are grouped by.
    pub fn group_by(mut self, names: &[&str]) -> Self {
        self.opts.group_by = names.iter().map(|n| n.to_string()).collect();
        self.opts.group_by_all = false;
        self
    }

    /// Groups alerts by all of their labels.
    pub fn group_by_all(mut self) -> Self {
        self.opts.group_by.clear();
        self.opts.group_by_all = true;
        self
    }

    /// Sets the group wait.
    pub fn group_wait(mut self, wait: Duration) -> Self {
        self.opts.group_wait = wait;
        self
    }

    /// Sets the group interval.
    pub fn group_interval(mut self, interval: Duration) -> Self {
        self.opts.group_interval = interval;
        self
    }

    /// Sets the repeat interval.
    pub fn repeat_interval(mut self, interval: Duration) -> Self {
        self.opts.repeat_interval = interval;
        self
    }

    /// Sets the mute time intervals.
    pub fn mute_time_intervals(mut self, names: &[&str]) -> Self {
        self.opts.mute_time_intervals = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Builds the `Route`.
    pub fn build(self) -> Arc<Route> {
        Arc::new(Route::new(self.id, self.key, self.opts))
    }
}
