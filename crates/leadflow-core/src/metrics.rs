//! Prometheus counters for the dispatch and feedback workers

use prometheus::{IntCounter, Registry};

/// Dispatch worker counters
#[derive(Clone)]
pub struct DispatchMetrics {
    pub cycles_total: IntCounter,
    pub leads_dispatched_total: IntCounter,
    pub claim_conflicts_total: IntCounter,
    pub verification_enqueued_total: IntCounter,
    pub feedback_events_total: IntCounter,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self {
            cycles_total: IntCounter::new("leadflow_cycles_total", "Dispatch cycles executed")
                .expect("valid metric"),
            leads_dispatched_total: IntCounter::new(
                "leadflow_leads_dispatched_total",
                "Leads handed to the delivery queue",
            )
            .expect("valid metric"),
            claim_conflicts_total: IntCounter::new(
                "leadflow_claim_conflicts_total",
                "Leads lost to overlapping dispatch cycles",
            )
            .expect("valid metric"),
            verification_enqueued_total: IntCounter::new(
                "leadflow_verification_enqueued_total",
                "Leads routed to the verification queue",
            )
            .expect("valid metric"),
            feedback_events_total: IntCounter::new(
                "leadflow_feedback_events_total",
                "Delivery outcome events processed",
            )
            .expect("valid metric"),
        }
    }

    /// Register all counters with a registry
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.cycles_total.clone()))?;
        registry.register(Box::new(self.leads_dispatched_total.clone()))?;
        registry.register(Box::new(self.claim_conflicts_total.clone()))?;
        registry.register(Box::new(self.verification_enqueued_total.clone()))?;
        registry.register(Box::new(self.feedback_events_total.clone()))?;
        Ok(())
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
