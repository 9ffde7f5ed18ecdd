//! Feedback aggregator
//!
//! Consumes delivery outcome events from the transport collaborator and
//! folds them into lead statuses and campaign counters. Events arrive
//! at-least-once; all transitions go through conditional claims, so a
//! replayed batch changes nothing. The account reputation is checked at
//! most once per batch, whatever the batch size.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use leadflow_common::types::{CampaignId, LeadId, MetricsDelta};
use leadflow_common::Result;
use leadflow_storage::models::{CampaignStatus, DeliveryEvent, DeliveryOutcome, LeadStatus};
use leadflow_storage::repository::{CampaignStore, DeliveryEventStore, LeadStore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::feedback::{ReputationService, ReputationStatus};
use crate::metrics::DispatchMetrics;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_BATCH_SIZE: i64 = 50;

#[derive(Default)]
struct CampaignBuckets {
    delivered: Vec<LeadId>,
    hard_bounced: Vec<LeadId>,
    soft_bounced: Vec<LeadId>,
    complained: Vec<LeadId>,
}

impl CampaignBuckets {
    fn has_negative_outcomes(&self) -> bool {
        !self.hard_bounced.is_empty() || !self.complained.is_empty()
    }
}

/// Aggregates a batch of delivery events into lead and campaign updates.
pub struct FeedbackAggregator {
    campaigns: Arc<dyn CampaignStore>,
    leads: Arc<dyn LeadStore>,
    reputation: Arc<dyn ReputationService>,
    metrics: DispatchMetrics,
}

impl FeedbackAggregator {
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        leads: Arc<dyn LeadStore>,
        reputation: Arc<dyn ReputationService>,
    ) -> Self {
        Self {
            campaigns,
            leads,
            reputation,
            metrics: DispatchMetrics::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Process one batch of delivery events.
    pub async fn process_batch(&self, events: &[DeliveryEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut buckets: HashMap<CampaignId, CampaignBuckets> = HashMap::new();
        let mut unsubscribed: Vec<LeadId> = Vec::new();

        for event in events {
            let Some(lead) = self
                .leads
                .find_by_message_id(&event.provider_message_id)
                .await?
            else {
                warn!(
                    provider_message_id = %event.provider_message_id,
                    outcome = ?event.outcome,
                    "Delivery event for an unknown message"
                );
                continue;
            };

            // Unsubscribes are terminal from any status and independent of
            // campaign counters.
            if event.outcome == DeliveryOutcome::Unsubscribed {
                unsubscribed.push(lead.id);
                continue;
            }

            let Some(campaign_id) = lead.campaign_id else {
                warn!(lead_id = %lead.id, "Delivery outcome for an unassigned lead");
                continue;
            };

            let bucket = buckets.entry(campaign_id).or_default();
            match event.outcome {
                DeliveryOutcome::Delivered => bucket.delivered.push(lead.id),
                DeliveryOutcome::Bounced => {
                    // Soft bounces are recoverable; hard bounces are final.
                    if event.bounce_type.as_deref() == Some("soft") {
                        bucket.soft_bounced.push(lead.id);
                    } else {
                        bucket.hard_bounced.push(lead.id);
                    }
                }
                DeliveryOutcome::Complained => bucket.complained.push(lead.id),
                DeliveryOutcome::Unsubscribed => {}
            }
        }

        self.check_reputation(&buckets).await?;

        for (campaign_id, bucket) in &buckets {
            self.apply_campaign(*campaign_id, bucket).await?;
        }

        if !unsubscribed.is_empty() {
            let marked = self.leads.mark_unsubscribed(&unsubscribed).await?;
            debug!(marked, "Marked leads unsubscribed");
        }

        self.metrics.feedback_events_total.inc_by(events.len() as u64);
        Ok(())
    }

    /// One reputation check per batch; a Poor verdict pauses the campaigns
    /// that produced negative outcomes. The check never blocks counter
    /// application.
    async fn check_reputation(&self, buckets: &HashMap<CampaignId, CampaignBuckets>) -> Result<()> {
        let affected: Vec<CampaignId> = buckets
            .iter()
            .filter(|(_, b)| b.has_negative_outcomes())
            .map(|(id, _)| *id)
            .collect();
        if affected.is_empty() {
            return Ok(());
        }

        match self.reputation.check().await {
            Ok(ReputationStatus::Poor) => {
                warn!("Account reputation is poor, pausing affected campaigns");
                for id in affected {
                    if self
                        .campaigns
                        .update_status(id, CampaignStatus::Running, CampaignStatus::Paused)
                        .await?
                    {
                        info!(campaign_id = %id, "Campaign paused on poor reputation");
                    }
                }
            }
            Ok(status) => debug!(?status, "Account reputation checked"),
            Err(e) => error!(error = %e, "Reputation check failed"),
        }
        Ok(())
    }

    async fn apply_campaign(&self, campaign_id: CampaignId, bucket: &CampaignBuckets) -> Result<()> {
        let mut delta = MetricsDelta::default();

        if !bucket.delivered.is_empty() {
            delta.delivered = self
                .leads
                .claim_batch(&bucket.delivered, LeadStatus::Sent, LeadStatus::Delivered)
                .await?
                .len() as i32;
        }

        if !bucket.hard_bounced.is_empty() {
            delta.bounced = self
                .leads
                .claim_batch(&bucket.hard_bounced, LeadStatus::Sent, LeadStatus::Bounced)
                .await?
                .len() as i32;
        }

        if !bucket.soft_bounced.is_empty() {
            delta.failed = self
                .leads
                .claim_batch(&bucket.soft_bounced, LeadStatus::Sent, LeadStatus::Failed)
                .await?
                .len() as i32;
        }

        if !bucket.complained.is_empty() {
            let mut claimed = self
                .leads
                .claim_batch(&bucket.complained, LeadStatus::Sent, LeadStatus::Complained)
                .await?;
            // A complaint can land after the delivery confirmation already
            // moved the lead on; it is still terminal.
            let late: Vec<LeadId> = bucket
                .complained
                .iter()
                .copied()
                .filter(|id| !claimed.contains(id))
                .collect();
            if !late.is_empty() {
                claimed.extend(
                    self.leads
                        .claim_batch(&late, LeadStatus::Delivered, LeadStatus::Complained)
                        .await?,
                );
            }
            delta.complained = claimed.len() as i32;
        }

        // Counters move once per campaign per batch; a replay claims
        // nothing and therefore writes nothing.
        if !delta.is_empty() {
            self.campaigns.apply_feedback(campaign_id, &delta).await?;
            debug!(campaign_id = %campaign_id, ?delta, "Applied feedback counters");
        }
        Ok(())
    }
}

/// Periodic worker that drains unprocessed delivery events.
pub struct FeedbackWorker {
    events: Arc<dyn DeliveryEventStore>,
    aggregator: FeedbackAggregator,
    poll_interval: Duration,
    batch_size: i64,
}

impl FeedbackWorker {
    pub fn new(events: Arc<dyn DeliveryEventStore>, aggregator: FeedbackAggregator) -> Self {
        Self {
            events,
            aggregator,
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub async fn run(self) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            batch_size = self.batch_size,
            "Feedback worker started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                error!(error = %e, "Feedback poll failed");
            }
        }
    }

    /// Drain one batch. Events are marked processed only after the whole
    /// batch applied; a failure leaves them for the next poll.
    pub async fn poll_once(&self) -> Result<()> {
        let events = self.events.fetch_unprocessed(self.batch_size).await?;
        if events.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        self.aggregator.process_batch(&events).await?;
        let marked = self.events.mark_processed(&ids).await?;
        debug!(processed = marked, "Feedback batch processed");
        Ok(())
    }
}
