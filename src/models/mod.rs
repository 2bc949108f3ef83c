//! This module contains the data models for the Herald dispatcher.

pub mod alert;
pub mod alert_group;
pub mod labels;
pub mod matcher;
pub mod route;

pub use alert::Alert;
pub use alert_group::{AlertGroup, DispatcherStats};
pub use labels::{Fingerprint, LabelSet};
pub use route::{Route, RouteConfig, RouteOpts};
