//! LeadFlow Storage - Lead and campaign persistence
//!
//! This crate provides the durable store adapter for LeadFlow: the
//! Postgres pool, the lead/campaign/delivery-event models, and the
//! conditional-update and batch-write primitives the orchestrator
//! relies on for overlap safety.

pub mod batch;
pub mod db;
pub mod models;
pub mod repository;

pub use batch::{write_with_retry, BatchOutcome, MAX_BATCH_CHUNK};
pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
