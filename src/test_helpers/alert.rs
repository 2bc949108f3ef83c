//! A builder for creating `Alert` instances for testing.

use chrono::{DateTime, Utc};

use crate::models::{Alert, LabelSet};

/// A builder for creating `Alert` instances for testing.
#[derive(Debug, Clone)]
pub struct AlertBuilder {
    labels: LabelSet,
    annotations: LabelSet,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    generator_url: String,
}

impl AlertBuilder {
    /// Creates a firing alert named `alertname` that started now.
    pub fn new(alertname: &str) -> Self {
        let now = Utc::now();
        Self {
            labels: LabelSet::from([("alertname", alertname)]),
            annotations: LabelSet::new(),
            starts_at: now,
            ends_at: None,
            updated_at: now,
            generator_url: String::new(),
        }
    }

    /// Adds a label.
    pub fn label(mut self, name: &str, value: &str) -> Self {
        self.labels.insert(name, value);
        self
    }

    /// Adds an annotation.
    pub fn annotation(mut self, name: &str, value: &str) -> Self {
        self.annotations.insert(name, value);
        self
    }

    /// Sets the start time.
    pub fn starts_at(mut self, starts_at: DateTime<Utc>) -> Self {
        self.starts_at = starts_at;
        self
    }

    /// Sets the end time, resolving the alert once it has passed.
    pub fn ends_at(mut self, ends_at: DateTime<Utc>) -> Self {
        self.ends_at = Some(ends_at);
        self
    }

    /// Sets the update time.
    pub fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Sets the generator URL.
    pub fn generator_url(mut self, url: &str) -> Self {
        self.generator_url = url.to_string();
        self
    }

    /// Builds the `Alert`.
    pub fn build(self) -> Alert {
        Alert {
            labels: self.labels,
            annotations: self.annotations,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            updated_at: self.updated_at,
            generator_url: self.generator_url,
        }
    }
}
