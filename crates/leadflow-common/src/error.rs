//! Error types for LeadFlow

use thiserror::Error;
use uuid::Uuid;

/// Main error type for LeadFlow
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid campaign transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Another dispatch cycle claimed the lead first. Expected under
    /// overlapping invocations; callers skip the lead, never retry.
    #[error("Claim conflict for lead {lead_id}")]
    ClaimConflict { lead_id: Uuid },

    /// Items that remained unwritten after the batch retry budget.
    #[error("Partial write failure: {} items unprocessed", failed.len())]
    PartialWriteFailure { failed: Vec<Uuid> },

    #[error("Delivery failure for lead {lead_id}: {reason}")]
    DeliveryFailure { lead_id: Uuid, reason: String },

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for LeadFlow
pub type Result<T> = std::result::Result<T, Error>;
