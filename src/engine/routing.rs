//! The routing tree deciding which routes an alert belongs to.

use std::{fmt::Write as _, path::PathBuf, sync::Arc};

#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::{
    loader::{Loadable, LoaderError, load_config},
    models::{LabelSet, Route, RouteConfig, route::GROUP_BY_ALL},
};

/// Errors that can occur while loading a routing tree.
#[derive(Debug, Error)]
pub enum RouteConfigError {
    /// The routes file could not be read or parsed.
    #[error("Failed to load routes: {0}")]
    Loader(#[from] LoaderError),

    /// The root route has no receiver to fall back on.
    #[error("The root route must have a receiver")]
    MissingRootReceiver,

    /// The root route carries matchers, so some alerts would not be routed.
    #[error("The root route must not have any matchers")]
    RootMatchers,

    /// A route mixes the `...` wildcard with explicit label names.
    #[error("Route '{0}' mixes '{GROUP_BY_ALL}' with other group_by labels")]
    MixedGroupBy(String),

    /// A route flushes its groups with a zero interval, leaving notifications
    /// no time to complete.
    #[error("Route '{0}' has a zero group_interval")]
    ZeroGroupInterval(String),
}

impl Loadable for RouteConfig {
    const KEY: &'static str = "route";

    type Error = RouteConfigError;

    fn validate(&mut self) -> Result<(), Self::Error> {
        if self.receiver.as_deref().is_none_or(str::is_empty) {
            return Err(RouteConfigError::MissingRootReceiver);
        }
        if !self.matchers.is_empty() {
            return Err(RouteConfigError::RootMatchers);
        }
        validate_route(self)
    }
}

fn validate_route(config: &RouteConfig) -> Result<(), RouteConfigError> {
    let receiver = || config.receiver.clone().unwrap_or_default();
    if config.group_interval.is_some_and(|interval| interval.is_zero()) {
        return Err(RouteConfigError::ZeroGroupInterval(receiver()));
    }
    if let Some(group_by) = &config.group_by
        && group_by.len() > 1
        && group_by.iter().any(|name| name == GROUP_BY_ALL)
    {
        return Err(RouteConfigError::MixedGroupBy(receiver()));
    }
    config.routes.iter().try_for_each(validate_route)
}

/// Resolves the routes an alert belongs to.
#[cfg_attr(test, automock)]
pub trait RoutingTree: Send + Sync {
    /// Returns the matching routes in evaluation order.
    fn match_routes(&self, labels: &LabelSet) -> Vec<Arc<Route>>;
}

/// A routing tree built once from its configuration.
#[derive(Debug, Clone)]
pub struct RouteTree {
    root: Arc<Route>,
}

impl RouteTree {
    /// Creates a tree rooted at `root`.
    pub fn new(root: Arc<Route>) -> Self {
        Self { root }
    }

    /// Loads and validates the tree stored under `route:` in a YAML file.
    pub fn load(path: PathBuf) -> Result<Self, RouteConfigError> {
        let config: RouteConfig = load_config(path)?;
        Ok(Self::new(Route::from_config(config)))
    }

    /// The root route.
    pub fn root(&self) -> &Arc<Route> {
        &self.root
    }

    /// Every route of the tree, depth first.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        let mut routes = Vec::new();
        self.root.walk(&mut |route, _| routes.push(Arc::clone(route)));
        routes
    }

    /// Renders the tree as an indented listing, one route per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.root.walk(&mut |route, depth| {
            let opts = &route.opts;
            let group_by = if opts.group_by_all {
                GROUP_BY_ALL.to_string()
            } else {
                opts.group_by.iter().cloned().collect::<Vec<_>>().join(",")
            };
            let _ = writeln!(
                out,
                "{:indent$}{} receiver={} group_by=[{}] group_wait={}s group_interval={}s repeat_interval={}s{}",
                "",
                route.id(),
                opts.receiver,
                group_by,
                opts.group_wait.as_secs(),
                opts.group_interval.as_secs(),
                opts.repeat_interval.as_secs(),
                if route.continue_matching { " continue" } else { "" },
                indent = depth * 2,
            );
        });
        out
    }
}

impl RoutingTree for RouteTree {
    fn match_routes(&self, labels: &LabelSet) -> Vec<Arc<Route>> {
        self.root.match_labels(labels)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Write};

    use tempfile::TempDir;

    use super::*;

    fn write_routes(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("routes.yaml");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_load_route_tree() {
        let dir = TempDir::new().unwrap();
        let path = write_routes(
            &dir,
            r#"
route:
  receiver: default
  group_by: [alertname]
  group_wait: 10
  routes:
    - receiver: pager
      matchers: ['severity="critical"']
      continue: true
      group_interval: 60
    - receiver: team-db
      matchers: ['service=~"db|cache"']
"#,
        );

        let tree = RouteTree::load(path).unwrap();
        assert_eq!(tree.routes().len(), 3);

        let labels = LabelSet::from([("severity", "critical"), ("service", "db")]);
        let matched: Vec<String> =
            tree.match_routes(&labels).iter().map(|r| r.opts.receiver.clone()).collect();
        assert_eq!(matched, vec!["pager", "team-db"]);

        let pager = &tree.root().routes[0];
        assert_eq!(pager.opts.group_wait.as_secs(), 10);
        assert_eq!(pager.opts.group_interval.as_secs(), 60);
        assert!(tree.render().contains("receiver=pager"));
    }

    #[test]
    fn test_root_without_receiver_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_routes(&dir, "route:\n  group_by: [alertname]\n");
        let result = RouteTree::load(path);
        assert!(matches!(result, Err(RouteConfigError::MissingRootReceiver)));
    }

    #[test]
    fn test_root_with_matchers_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_routes(&dir, "route:\n  receiver: default\n  matchers: ['a=\"b\"']\n");
        let result = RouteTree::load(path);
        assert!(matches!(result, Err(RouteConfigError::RootMatchers)));
    }

    #[test]
    fn test_mixed_wildcard_group_by_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_routes(
            &dir,
            "route:\n  receiver: default\n  routes:\n    - receiver: x\n      group_by: ['...', alertname]\n",
        );
        let result = RouteTree::load(path);
        assert!(matches!(result, Err(RouteConfigError::MixedGroupBy(r)) if r == "x"));
    }

    #[test]
    fn test_zero_group_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_routes(
            &dir,
            "route:\n  receiver: default\n  routes:\n    - receiver: x\n      group_interval: 0\n",
        );
        let result = RouteTree::load(path);
        assert!(matches!(result, Err(RouteConfigError::ZeroGroupInterval(r)) if r == "x"));
    }

    #[test]
    fn test_invalid_matcher_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_routes(&dir, "route:\n  receiver: default\n  routes:\n    - matchers: ['nope']\n");
        let result = RouteTree::load(path);
        assert!(matches!(result, Err(RouteConfigError::Loader(LoaderError::ParseError(_)))));
    }
}
