//! Dispatch Module - Campaign lifecycle, scheduling windows, pacing, and
//! the cycle orchestrator

mod lifecycle;
mod pacing;
mod state;
mod window;
mod worker;

pub use lifecycle::CampaignLifecycle;
pub use pacing::{cumulative_offsets, next_delay_ms};
pub use state::{allowed_targets, can_transition, transition};
pub use window::{evaluate, local_today, WindowDecision};
pub use worker::DispatchWorker;
