//! Feedback Module - Delivery outcome aggregation and account reputation

mod aggregator;
mod reputation;

pub use aggregator::{FeedbackAggregator, FeedbackWorker};
pub use reputation::{ReputationService, ReputationStatus, StoreReputationService};
