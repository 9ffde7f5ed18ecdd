//! Repository layer for data access

pub mod campaigns;
pub mod events;
pub mod leads;

// Re-export repository traits and implementations
pub use campaigns::{CampaignStore, DbCampaignRepository};
pub use events::{DbDeliveryEventRepository, DeliveryEventStore};
pub use leads::{DbLeadRepository, LeadStore};
