//! LeadFlow Core - Campaign sending orchestration
//!
//! This crate provides the dispatch cycle orchestrator for LeadFlow:
//! the campaign lifecycle state machine, the schedule window evaluator,
//! human-like pacing, the feedback aggregator, and the queue adapters.

pub mod dispatch;
pub mod feedback;
pub mod metrics;
pub mod queue;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatch::{
    can_transition, evaluate, transition, CampaignLifecycle, DispatchWorker, WindowDecision,
};
pub use feedback::{
    FeedbackAggregator, FeedbackWorker, ReputationService, ReputationStatus,
    StoreReputationService,
};
pub use metrics::DispatchMetrics;
pub use queue::{
    DeliveryJob, DeliveryQueue, PgDeliveryQueue, PgVerificationQueue, VerificationJob,
    VerificationQueue,
};
