//! Delivery event repository
//!
//! Delivery outcomes arrive asynchronously from the transport collaborator
//! and are drained by the feedback worker. Consumption is at-least-once;
//! the aggregator's transitions are idempotent.

use crate::db::DatabasePool;
use crate::models::{DeliveryEvent, NewDeliveryEvent};
use async_trait::async_trait;
use leadflow_common::{Error, Result};
use uuid::Uuid;

/// Delivery event repository trait
#[async_trait]
pub trait DeliveryEventStore: Send + Sync {
    async fn insert(&self, input: NewDeliveryEvent) -> Result<DeliveryEvent>;
    async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<DeliveryEvent>>;
    async fn mark_processed(&self, ids: &[Uuid]) -> Result<u64>;
}

/// Database delivery event repository
#[derive(Clone)]
pub struct DbDeliveryEventRepository {
    pool: DatabasePool,
}

impl DbDeliveryEventRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryEventStore for DbDeliveryEventRepository {
    async fn insert(&self, input: NewDeliveryEvent) -> Result<DeliveryEvent> {
        let id = Uuid::now_v7();

        sqlx::query_as::<_, DeliveryEvent>(
            r#"
            INSERT INTO delivery_events (id, provider_message_id, outcome, bounce_type, reason, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.provider_message_id)
        .bind(input.outcome)
        .bind(&input.bounce_type)
        .bind(&input.reason)
        .bind(input.occurred_at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn fetch_unprocessed(&self, limit: i64) -> Result<Vec<DeliveryEvent>> {
        // Overlapping pollers may see the same page; the aggregator's
        // conditional transitions make duplicate consumption harmless.
        sqlx::query_as::<_, DeliveryEvent>(
            r#"
            SELECT * FROM delivery_events
            WHERE processed_at IS NULL
            ORDER BY occurred_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_processed(&self, ids: &[Uuid]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE delivery_events SET processed_at = NOW() WHERE id = ANY($1)",
        )
        .bind(ids)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
