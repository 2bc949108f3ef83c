//! Configuration module for Herald.

mod app_config;
mod helpers;

pub use app_config::AppConfig;
pub use helpers::{deserialize_duration_from_seconds, deserialize_optional_duration_from_seconds};
