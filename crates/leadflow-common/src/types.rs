//! Common types for LeadFlow

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for leads
pub type LeadId = Uuid;

/// Counter deltas accumulated by the feedback aggregator, applied once
/// per campaign per batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsDelta {
    pub delivered: i32,
    pub bounced: i32,
    pub complained: i32,
    pub failed: i32,
}

impl MetricsDelta {
    /// True when nothing would change if applied.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_delta_empty() {
        assert!(MetricsDelta::default().is_empty());
        assert!(!MetricsDelta {
            bounced: 1,
            ..Default::default()
        }
        .is_empty());
    }
}
