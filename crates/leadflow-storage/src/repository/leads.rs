//! Lead repository
//!
//! All lead mutation goes through the conditional claim primitives or the
//! retrying batch writer; there is no read-then-unconditional-write path.

use crate::batch::{write_with_retry, BatchOutcome};
use crate::db::DatabasePool;
use crate::models::{Lead, LeadSelection, LeadStatus, LeadUpdate};
use async_trait::async_trait;
use leadflow_common::types::{CampaignId, LeadId};
use leadflow_common::{Error, Result};

/// Lead repository trait
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Optimistic-concurrency primitive: transition a single lead only if
    /// its status still matches `expected`. Two overlapping cycles racing
    /// on the same lead observe exactly one success.
    async fn claim(&self, lead_id: LeadId, expected: LeadStatus, new: LeadStatus) -> Result<bool>;

    /// Batched conditional transition over an id set. Returns the ids
    /// actually claimed; lost races are the silent complement.
    async fn claim_batch(
        &self,
        lead_ids: &[LeadId],
        expected: LeadStatus,
        new: LeadStatus,
    ) -> Result<Vec<LeadId>>;

    /// Batch status write with retry of the unprocessed subset.
    async fn write_batch(&self, updates: Vec<LeadUpdate>) -> Result<BatchOutcome>;

    /// Page of leads matching the campaign's selection, ordered by the
    /// stable assignment position, strictly after `after_position`.
    async fn fetch_eligible(
        &self,
        campaign_id: CampaignId,
        selection: &LeadSelection,
        limit: i64,
        after_position: Option<i64>,
    ) -> Result<Vec<Lead>>;

    /// Count of leads still matching the campaign's selection.
    async fn count_eligible(
        &self,
        campaign_id: CampaignId,
        selection: &LeadSelection,
    ) -> Result<i64>;

    /// Resolve a lead by the provider message id attached at send time.
    async fn find_by_message_id(&self, provider_message_id: &str) -> Result<Option<Lead>>;

    /// Recover leads parked by the daily cap back into the queue.
    async fn requeue_daily_skipped(&self, campaign_id: CampaignId) -> Result<u64>;

    /// Explicit unsubscribe: terminal from any non-terminal status.
    async fn mark_unsubscribed(&self, lead_ids: &[LeadId]) -> Result<u64>;
}

/// Database lead repository
#[derive(Clone)]
pub struct DbLeadRepository {
    pool: DatabasePool,
}

impl DbLeadRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn write_chunk(&self, chunk: Vec<LeadUpdate>) -> Result<Vec<LeadId>> {
        let ids: Vec<LeadId> = chunk.iter().map(|u| u.lead_id).collect();
        let statuses: Vec<LeadStatus> = chunk.iter().map(|u| u.status).collect();
        let errors: Vec<Option<String>> = chunk.iter().map(|u| u.last_error.clone()).collect();

        sqlx::query(
            r#"
            UPDATE leads AS l
            SET status = u.status,
                last_error = u.last_error,
                updated_at = NOW()
            FROM (
                SELECT * FROM UNNEST($1::uuid[], $2::lead_status[], $3::text[])
            ) AS u(id, status, last_error)
            WHERE l.id = u.id
            "#,
        )
        .bind(&ids)
        .bind(&statuses)
        .bind(&errors)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        // A successful statement wrote the whole chunk.
        Ok(vec![])
    }
}

#[async_trait]
impl LeadStore for DbLeadRepository {
    async fn claim(&self, lead_id: LeadId, expected: LeadStatus, new: LeadStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(lead_id)
        .bind(expected)
        .bind(new)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_batch(
        &self,
        lead_ids: &[LeadId],
        expected: LeadStatus,
        new: LeadStatus,
    ) -> Result<Vec<LeadId>> {
        if lead_ids.is_empty() {
            return Ok(vec![]);
        }

        let claimed: Vec<(LeadId,)> = sqlx::query_as(
            r#"
            UPDATE leads
            SET status = $3, updated_at = NOW()
            WHERE id = ANY($1) AND status = $2
            RETURNING id
            "#,
        )
        .bind(lead_ids)
        .bind(expected)
        .bind(new)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(claimed.into_iter().map(|(id,)| id).collect())
    }

    async fn write_batch(&self, updates: Vec<LeadUpdate>) -> Result<BatchOutcome> {
        let repo = self.clone();
        let outcome = write_with_retry(updates, |u| u.lead_id, move |chunk| {
            let repo = repo.clone();
            async move { repo.write_chunk(chunk).await }
        })
        .await;

        Ok(outcome)
    }

    async fn fetch_eligible(
        &self,
        campaign_id: CampaignId,
        selection: &LeadSelection,
        limit: i64,
        after_position: Option<i64>,
    ) -> Result<Vec<Lead>> {
        let lead_types: Vec<String> = selection.lead_types.iter().cloned().collect();

        sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM leads
            WHERE campaign_id = $1
              AND status = ANY($2)
              AND (CARDINALITY($3::text[]) = 0 OR lead_type = ANY($3))
              AND position > $4
            ORDER BY position ASC
            LIMIT $5
            "#,
        )
        .bind(campaign_id)
        .bind(&selection.statuses)
        .bind(&lead_types)
        .bind(after_position.unwrap_or(0))
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn count_eligible(
        &self,
        campaign_id: CampaignId,
        selection: &LeadSelection,
    ) -> Result<i64> {
        let lead_types: Vec<String> = selection.lead_types.iter().cloned().collect();

        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM leads
            WHERE campaign_id = $1
              AND status = ANY($2)
              AND (CARDINALITY($3::text[]) = 0 OR lead_type = ANY($3))
            "#,
        )
        .bind(campaign_id)
        .bind(&selection.statuses)
        .bind(&lead_types)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(count.0)
    }

    async fn find_by_message_id(&self, provider_message_id: &str) -> Result<Option<Lead>> {
        sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE provider_message_id = $1")
            .bind(provider_message_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn requeue_daily_skipped(&self, campaign_id: CampaignId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET status = $3, updated_at = NOW()
            WHERE campaign_id = $1 AND status = $2
            "#,
        )
        .bind(campaign_id)
        .bind(LeadStatus::SkippedDailyCap)
        .bind(LeadStatus::Queued)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn mark_unsubscribed(&self, lead_ids: &[LeadId]) -> Result<u64> {
        if lead_ids.is_empty() {
            return Ok(0);
        }

        let terminal = [
            LeadStatus::Delivered,
            LeadStatus::Bounced,
            LeadStatus::Complained,
            LeadStatus::Unsubscribed,
        ];

        let result = sqlx::query(
            r#"
            UPDATE leads
            SET status = $3, updated_at = NOW()
            WHERE id = ANY($1) AND NOT (status = ANY($2))
            "#,
        )
        .bind(lead_ids)
        .bind(&terminal[..])
        .bind(LeadStatus::Unsubscribed)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
