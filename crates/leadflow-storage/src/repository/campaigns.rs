//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{AccountTotals, Campaign, CampaignStatus, NewCampaign};
use async_trait::async_trait;
use chrono::NaiveDate;
use leadflow_common::types::{CampaignId, MetricsDelta};
use leadflow_common::{Error, Result};
use sqlx::types::Json;
use uuid::Uuid;

/// Campaign repository trait
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn create(&self, input: NewCampaign) -> Result<Campaign>;
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;
    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;

    /// Conditional status transition; false when the expected status no
    /// longer matches. The caller validates the transition itself.
    async fn update_status(
        &self,
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<bool>;

    /// Atomically reserve `n` sends against today's cap, folding day
    /// rollover into the predicate. False when an overlapping cycle has
    /// already consumed the capacity.
    async fn reserve_daily_capacity(
        &self,
        id: CampaignId,
        n: i32,
        daily_limit: i32,
        today_local: NaiveDate,
    ) -> Result<bool>;

    /// Single per-campaign-per-cycle write of the sent counter delta and
    /// the resume cursor.
    async fn persist_cycle(
        &self,
        id: CampaignId,
        sent_delta: i32,
        resume_position: Option<i64>,
    ) -> Result<()>;

    /// Apply aggregated feedback counters, once per campaign per batch.
    async fn apply_feedback(&self, id: CampaignId, delta: &MetricsDelta) -> Result<()>;

    /// Account-wide totals for the reputation check.
    async fn account_totals(&self) -> Result<AccountTotals>;
}

/// Database campaign repository
#[derive(Clone)]
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignStore for DbCampaignRepository {
    async fn create(&self, input: NewCampaign) -> Result<Campaign> {
        let id = Uuid::now_v7();

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (id, name, status, template_ref, schedule, delay_config, lead_selection)
            VALUES ($1, $2, 'draft', $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.template_ref)
        .bind(Json(&input.schedule))
        .bind(Json(&input.delay_config))
        .bind(Json(&input.lead_selection))
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE status = $1 ORDER BY created_at ASC",
        )
        .bind(status)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_status(
        &self,
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn reserve_daily_capacity(
        &self,
        id: CampaignId,
        n: i32,
        daily_limit: i32,
        today_local: NaiveDate,
    ) -> Result<bool> {
        // A stale last_sent_date means the counter belongs to a previous
        // day and restarts from zero.
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET sent_today = CASE WHEN last_sent_date IS DISTINCT FROM $4 THEN $2
                                  ELSE sent_today + $2 END,
                last_sent_date = $4,
                updated_at = NOW()
            WHERE id = $1
              AND (CASE WHEN last_sent_date IS DISTINCT FROM $4 THEN $2
                        ELSE sent_today + $2 END) <= $3
            "#,
        )
        .bind(id)
        .bind(n)
        .bind(daily_limit)
        .bind(today_local)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn persist_cycle(
        &self,
        id: CampaignId,
        sent_delta: i32,
        resume_position: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET sent_count = sent_count + $2,
                resume_position = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sent_delta)
        .bind(resume_position)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn apply_feedback(&self, id: CampaignId, delta: &MetricsDelta) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET delivered_count = delivered_count + $2,
                bounced_count = bounced_count + $3,
                complained_count = complained_count + $4,
                failed_count = failed_count + $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(delta.delivered)
        .bind(delta.bounced)
        .bind(delta.complained)
        .bind(delta.failed)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn account_totals(&self) -> Result<AccountTotals> {
        sqlx::query_as::<_, AccountTotals>(
            r#"
            SELECT COALESCE(SUM(sent_count), 0)::BIGINT AS sent,
                   COALESCE(SUM(bounced_count), 0)::BIGINT AS bounced,
                   COALESCE(SUM(complained_count), 0)::BIGINT AS complained
            FROM campaigns
            "#,
        )
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
