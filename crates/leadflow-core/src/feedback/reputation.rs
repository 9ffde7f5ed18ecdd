//! Account-level sending reputation
//!
//! Computed from account-wide totals and cached for a configurable TTL,
//! so a busy feedback worker never hammers the aggregate query.

use std::sync::Arc;

use async_trait::async_trait;
use leadflow_common::config::ReputationConfig;
use leadflow_common::Result;
use leadflow_storage::models::AccountTotals;
use leadflow_storage::repository::CampaignStore;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Verdict on the account's sending health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReputationStatus {
    Healthy,
    /// Above half of a threshold; worth watching, sending continues.
    Degraded,
    /// Over a threshold; affected campaigns get paused.
    Poor,
}

#[async_trait]
pub trait ReputationService: Send + Sync {
    async fn check(&self) -> Result<ReputationStatus>;
}

/// Reputation computed from store totals with a TTL cache.
pub struct StoreReputationService {
    campaigns: Arc<dyn CampaignStore>,
    config: ReputationConfig,
    cache: RwLock<Option<(Instant, ReputationStatus)>>,
}

impl StoreReputationService {
    pub fn new(campaigns: Arc<dyn CampaignStore>, config: ReputationConfig) -> Self {
        Self {
            campaigns,
            config,
            cache: RwLock::new(None),
        }
    }

    fn classify(&self, totals: &AccountTotals) -> ReputationStatus {
        // Rates over a tiny sample are noise, not signal.
        if totals.sent < self.config.min_sample {
            return ReputationStatus::Healthy;
        }

        let bounce = totals.bounce_rate();
        let complaint = totals.complaint_rate();

        if bounce > self.config.bounce_rate_threshold
            || complaint > self.config.complaint_rate_threshold
        {
            ReputationStatus::Poor
        } else if bounce > self.config.bounce_rate_threshold / 2.0
            || complaint > self.config.complaint_rate_threshold / 2.0
        {
            ReputationStatus::Degraded
        } else {
            ReputationStatus::Healthy
        }
    }
}

#[async_trait]
impl ReputationService for StoreReputationService {
    async fn check(&self) -> Result<ReputationStatus> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);

        if let Some((computed_at, status)) = *self.cache.read().await {
            if computed_at.elapsed() < ttl {
                return Ok(status);
            }
        }

        let totals = self.campaigns.account_totals().await?;
        let status = self.classify(&totals);
        debug!(
            sent = totals.sent,
            bounce_rate = totals.bounce_rate(),
            complaint_rate = totals.complaint_rate(),
            ?status,
            "Computed account reputation"
        );

        *self.cache.write().await = Some((Instant::now(), status));
        Ok(status)
    }
}
