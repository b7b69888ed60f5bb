//! Capacity-fault classification.
//!
//! Providers report "no room under this group" as free text on the
//! instance fault. The allocator asks a [`FaultClassifier`] instead of
//! matching strings itself, so the policy can change per provider.

/// Decides whether a failure reason means the region is out of capacity
/// for the current placement group.
pub trait FaultClassifier: Send + Sync {
    fn is_capacity_exhausted(&self, reason: &str) -> bool;
}

/// Matches a fixed substring (Nova's `No valid host` by default).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerClassifier {
    marker: String,
}

impl MarkerClassifier {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        Self::new("No valid host")
    }
}

impl FaultClassifier for MarkerClassifier {
    fn is_capacity_exhausted(&self, reason: &str) -> bool {
        !self.marker.is_empty() && reason.contains(&self.marker)
    }
}

impl<F> FaultClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_capacity_exhausted(&self, reason: &str) -> bool {
        self(reason)
    }
}
