//! A set of helpers for testing

mod alert;
mod notification;
mod route;

pub use alert::AlertBuilder;
pub use notification::{RecordingStage, notify_context};
pub use route::RouteBuilder;
