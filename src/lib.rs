#![warn(missing_docs)]
//! Herald groups a stream of alerts by route and labels and sends each group
//! to its receiver on a debounced, periodic schedule.

pub mod config;
pub mod engine;
pub mod loader;
pub mod models;
pub mod notification;
pub mod persistence;
pub mod providers;
pub mod supervisor;
pub mod test_helpers;
