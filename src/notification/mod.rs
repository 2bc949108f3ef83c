//! # Notification Pipeline
//!
//! Flushed aggregation groups hand their alerts to a [`NotificationStage`]
//! together with a [`NotifyContext`] describing the flush: the tick time,
//! the group key and labels, the receiver and the deadline by which the
//! notification has to complete.
//!
//! The engine only cares whether a stage succeeded. A failed notification
//! keeps the group's alerts buffered so the next flush retries them.

pub mod context;
pub mod error;
/// A stage printing notifications as JSON lines.
pub mod stdout;
/// The interface implemented by notification stages.
pub mod traits;

pub use context::{NotifyContext, NotifyTimeout, group_interval_timeout, min_notify_timeout};
pub use error::NotificationError;
pub use stdout::StdoutStage;
pub use traits::NotificationStage;
