//! Caps on the number of aggregation groups.

/// A policy limiting how many aggregation groups a dispatcher may hold.
pub trait Limits: Send + Sync {
    /// The maximum number of aggregation groups. Zero means unlimited.
    fn max_number_of_aggregation_groups(&self) -> usize;
}

/// Never limits the number of groups.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedLimits;

impl Limits for UnlimitedLimits {
    fn max_number_of_aggregation_groups(&self) -> usize {
        0
    }
}

/// Allows a fixed number of groups.
#[derive(Debug, Clone, Copy)]
pub struct StaticLimits(pub usize);

impl Limits for StaticLimits {
    fn max_number_of_aggregation_groups(&self) -> usize {
        self.0
    }
}
