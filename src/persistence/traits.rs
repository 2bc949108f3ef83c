//! Storage interfaces used by aggregation groups and the dispatcher.

#[cfg(test)]
use mockall::automock;

use super::error::BufferError;
use crate::models::Alert;

/// An alert as returned by [`AlertBuffer::list`], together with the revision
/// it had when it was listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSnapshot {
    /// The stored alert.
    pub alert: Alert,
    /// The revision of the entry at the time of listing.
    pub revision: u64,
}

/// Thread-safe per-group storage of alerts keyed by fingerprint.
///
/// Every `set` bumps the revision of the stored entry, which lets
/// `delete_if_not_modified` skip alerts that changed after a snapshot was
/// taken.
#[cfg_attr(test, automock)]
pub trait AlertBuffer: Send + Sync {
    /// Inserts the alert, replacing any alert with the same fingerprint.
    fn set(&self, alert: Alert) -> Result<(), BufferError>;

    /// Returns every stored alert with its current revision.
    fn list(&self) -> Vec<AlertSnapshot>;

    /// Returns true if no alert is stored.
    fn is_empty(&self) -> bool;

    /// Deletes each snapshotted alert whose stored revision still equals the
    /// snapshot's revision.
    fn delete_if_not_modified(&self, snapshots: &[AlertSnapshot]) -> Result<(), BufferError>;
}

/// Bookkeeping tied to aggregation groups, such as the time intervals that
/// currently mute a group.
#[cfg_attr(test, automock)]
pub trait GroupMarker: Send + Sync {
    /// Drops all state kept for the group `group_key` of route `route_id`.
    fn delete_by_group_key(&self, route_id: &str, group_key: &str);
}
