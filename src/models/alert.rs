//! The alert record flowing through the dispatcher.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::labels::{Fingerprint, LabelSet};

/// Labels that take precedence over the full label set when ordering
/// alerts.
const ORDERING_LABELS: [&str; 2] = ["job", "instance"];

/// A fired or resolved alert.
///
/// Two alerts with identical labels share an identity and overwrite each
/// other wherever they are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// The identifying labels of the alert.
    pub labels: LabelSet,

    /// Additional, non-identifying information.
    #[serde(default)]
    pub annotations: LabelSet,

    /// When the alert started firing.
    pub starts_at: DateTime<Utc>,

    /// When the alert resolved. `None` means it is still firing.
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,

    /// When the alert was last updated by its producer.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    /// A link back to the entity that generated the alert.
    #[serde(default)]
    pub generator_url: String,
}

impl Alert {
    /// Returns the fingerprint of the alert's labels.
    pub fn fingerprint(&self) -> Fingerprint {
        self.labels.fingerprint()
    }

    /// Returns the value of the `alertname` label, or an empty string.
    pub fn name(&self) -> &str {
        self.labels.get("alertname").unwrap_or_default()
    }

    /// Returns true if the alert is resolved at `ts`.
    pub fn resolved_at(&self, ts: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|ends_at| ends_at <= ts)
    }

    /// Orders alerts by their `job` label, then `instance`, then the full
    /// label set.
    pub fn display_order(&self, other: &Self) -> Ordering {
        for name in ORDERING_LABELS {
            match (self.labels.get(name), other.labels.get(name)) {
                (Some(a), Some(b)) if a != b => return a.cmp(b),
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                _ => {}
            }
        }
        self.labels.cmp(&other.labels)
    }
}

/// Sorts alerts with [`Alert::display_order`], keeping equal elements in
/// their original order.
pub fn sort_alerts(alerts: &mut [Alert]) {
    alerts.sort_by(Alert::display_order);
}
