//! In-memory implementation of [`GroupMarker`].

use dashmap::DashMap;

use super::traits::GroupMarker;

/// Tracks which aggregation groups are muted and by which time intervals.
#[derive(Debug, Default)]
pub struct MemoryGroupMarker {
    /// Muting time interval names per `(route_id, group_key)`.
    muted: DashMap<(String, String), Vec<String>>,
}

impl MemoryGroupMarker {
    /// Creates an empty marker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the group is muted by `intervals`. An empty list clears
    /// the mute.
    pub fn set_muted(&self, route_id: &str, group_key: &str, intervals: Vec<String>) {
        let key = (route_id.to_string(), group_key.to_string());
        if intervals.is_empty() {
            self.muted.remove(&key);
        } else {
            self.muted.insert(key, intervals);
        }
    }

    /// Returns the intervals muting the group, if it is muted.
    pub fn muted(&self, route_id: &str, group_key: &str) -> Option<Vec<String>> {
        self.muted.get(&(route_id.to_string(), group_key.to_string())).map(|e| e.value().clone())
    }

    /// Returns the number of groups with recorded state.
    pub fn len(&self) -> usize {
        self.muted.len()
    }

    /// Returns true if no group has recorded state.
    pub fn is_empty(&self) -> bool {
        self.muted.is_empty()
    }
}

impl GroupMarker for MemoryGroupMarker {
    fn delete_by_group_key(&self, route_id: &str, group_key: &str) {
        if self.muted.remove(&(route_id.to_string(), group_key.to_string())).is_some() {
            tracing::debug!(route_id, group_key, "Dropped mute state of reclaimed group.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear_muted() {
        let marker = MemoryGroupMarker::new();
        marker.set_muted("r1", "{}:{a=\"1\"}", vec!["weekend".to_string()]);

        assert_eq!(marker.muted("r1", "{}:{a=\"1\"}"), Some(vec!["weekend".to_string()]));
        assert_eq!(marker.muted("r2", "{}:{a=\"1\"}"), None);

        marker.set_muted("r1", "{}:{a=\"1\"}", vec![]);
        assert!(marker.is_empty());
    }

    #[test]
    fn test_delete_by_group_key_only_drops_that_group() {
        let marker = MemoryGroupMarker::new();
        marker.set_muted("r1", "g1", vec!["night".to_string()]);
        marker.set_muted("r1", "g2", vec!["night".to_string()]);

        marker.delete_by_group_key("r1", "g1");
        marker.delete_by_group_key("r1", "unknown");

        assert_eq!(marker.len(), 1);
        assert!(marker.muted("r1", "g2").is_some());
    }
}
