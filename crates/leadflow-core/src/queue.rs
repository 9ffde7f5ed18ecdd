//! Delivery and verification queue adapters
//!
//! Ownership of a message transfers to the queue at enqueue time; the
//! orchestrator never re-reads or cancels an enqueued message. Both
//! queues are at-least-once and make no ordering guarantee.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use leadflow_common::types::{CampaignId, LeadId};
use leadflow_common::{Error, Result};
use leadflow_storage::db::DatabasePool;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// A claimed lead plus its computed send offset within the batch window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub lead_id: LeadId,
    pub campaign_id: CampaignId,
    pub rendered_message_ref: String,
    pub delay_ms: u64,
}

/// A lead whose deliverability has not yet been confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationJob {
    pub lead_id: LeadId,
    pub campaign_id: CampaignId,
}

/// Outbound delivery queue
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn enqueue_batch(&self, jobs: Vec<DeliveryJob>) -> Result<()>;
}

/// Deliverability verification queue, decoupled from the send path
#[async_trait]
pub trait VerificationQueue: Send + Sync {
    async fn enqueue_batch(&self, jobs: Vec<VerificationJob>) -> Result<()>;
}

const DELIVERY_QUEUE: &str = "delivery";
const VERIFICATION_QUEUE: &str = "verification";

/// Postgres-backed delivery queue
#[derive(Clone)]
pub struct PgDeliveryQueue {
    db_pool: DatabasePool,
}

impl PgDeliveryQueue {
    pub fn new(db_pool: DatabasePool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl DeliveryQueue for PgDeliveryQueue {
    async fn enqueue_batch(&self, jobs: Vec<DeliveryJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let count = jobs.len();
        let mut ids = Vec::with_capacity(count);
        let mut payloads = Vec::with_capacity(count);
        let mut scheduled = Vec::with_capacity(count);

        for job in &jobs {
            ids.push(Uuid::now_v7());
            payloads.push(
                serde_json::to_value(job).map_err(|e| Error::Queue(e.to_string()))?,
            );
            scheduled.push(now + Duration::milliseconds(job.delay_ms as i64));
        }

        sqlx::query(
            r#"
            INSERT INTO outbound_jobs (id, queue, payload, status, scheduled_at)
            SELECT u.id, $1, u.payload, 'pending', u.scheduled_at
            FROM UNNEST($2::uuid[], $3::jsonb[], $4::timestamptz[]) AS u(id, payload, scheduled_at)
            "#,
        )
        .bind(DELIVERY_QUEUE)
        .bind(&ids)
        .bind(&payloads)
        .bind(&scheduled)
        .execute(self.db_pool.pool())
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;

        debug!(count, "Enqueued delivery jobs");
        Ok(())
    }
}

/// Postgres-backed verification queue
#[derive(Clone)]
pub struct PgVerificationQueue {
    db_pool: DatabasePool,
}

impl PgVerificationQueue {
    pub fn new(db_pool: DatabasePool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl VerificationQueue for PgVerificationQueue {
    async fn enqueue_batch(&self, jobs: Vec<VerificationJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let count = jobs.len();
        let mut ids = Vec::with_capacity(count);
        let mut payloads = Vec::with_capacity(count);

        for job in &jobs {
            ids.push(Uuid::now_v7());
            payloads.push(
                serde_json::to_value(job).map_err(|e| Error::Queue(e.to_string()))?,
            );
        }

        sqlx::query(
            r#"
            INSERT INTO outbound_jobs (id, queue, payload, status, scheduled_at)
            SELECT u.id, $1, u.payload, 'pending', NOW()
            FROM UNNEST($2::uuid[], $3::jsonb[]) AS u(id, payload)
            "#,
        )
        .bind(VERIFICATION_QUEUE)
        .bind(&ids)
        .bind(&payloads)
        .execute(self.db_pool.pool())
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;

        debug!(count, "Enqueued verification jobs");
        Ok(())
    }
}
