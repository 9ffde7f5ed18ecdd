//! Dispatch cycle orchestrator
//!
//! One worker per deployment. Each tick evaluates every running campaign
//! against its schedule window, claims a batch of verified leads, reserves
//! daily capacity, and hands the batch to the delivery queue with
//! human-like send offsets. All lead and campaign mutation goes through
//! conditional writes, so overlapping cycles degrade to lost claims
//! instead of duplicate sends.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use leadflow_common::Result;
use leadflow_storage::models::{Campaign, CampaignStatus, Lead, LeadSelection, LeadStatus, LeadUpdate};
use leadflow_storage::repository::{CampaignStore, LeadStore};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::dispatch::{pacing, window};
use crate::metrics::DispatchMetrics;
use crate::queue::{DeliveryJob, DeliveryQueue, VerificationJob, VerificationQueue};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_CAMPAIGN_BUDGET: Duration = Duration::from_secs(30);

/// Periodic worker that drives the dispatch cycle.
pub struct DispatchWorker {
    campaigns: Arc<dyn CampaignStore>,
    leads: Arc<dyn LeadStore>,
    delivery: Arc<dyn DeliveryQueue>,
    verification: Arc<dyn VerificationQueue>,
    metrics: DispatchMetrics,
    poll_interval: Duration,
    campaign_budget: Duration,
}

impl DispatchWorker {
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        leads: Arc<dyn LeadStore>,
        delivery: Arc<dyn DeliveryQueue>,
        verification: Arc<dyn VerificationQueue>,
    ) -> Self {
        Self {
            campaigns,
            leads,
            delivery,
            verification,
            metrics: DispatchMetrics::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            campaign_budget: DEFAULT_CAMPAIGN_BUDGET,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Cap on wall-clock time spent on a single campaign per cycle, so one
    /// slow campaign cannot starve the rest.
    pub fn with_campaign_budget(mut self, budget: Duration) -> Self {
        self.campaign_budget = budget;
        self
    }

    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run the worker loop forever.
    pub async fn run(self) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Dispatch worker started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle(Utc::now()).await {
                error!(error = %e, "Dispatch cycle failed");
            }
        }
    }

    /// One dispatch cycle over all running campaigns, then finalization of
    /// aborting ones. Campaign failures are isolated: one campaign's error
    /// never blocks the others.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<()> {
        self.metrics.cycles_total.inc();

        let running = self.campaigns.list_by_status(CampaignStatus::Running).await?;
        for campaign in running {
            let id = campaign.id;
            match tokio::time::timeout(self.campaign_budget, self.process_campaign(campaign, now))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(campaign_id = %id, error = %e, "Campaign dispatch failed"),
                Err(_) => warn!(campaign_id = %id, "Campaign exceeded its cycle time budget"),
            }
        }

        self.finalize_aborting().await
    }

    async fn process_campaign(&self, campaign: Campaign, now: DateTime<Utc>) -> Result<()> {
        let schedule = &campaign.schedule.0;

        // Window first: a closed window costs zero store calls.
        let decision = window::evaluate(schedule, now)?;
        if !decision.allowed {
            debug!(campaign_id = %campaign.id, "Sending window closed");
            return Ok(());
        }
        let today = window::local_today(schedule, now)?;

        // Day rollover: recover leads parked by yesterday's cap and restart
        // the scan from the top of the assignment order.
        let mut resume = campaign.resume_position;
        if matches!(campaign.last_sent_date, Some(d) if d != today) {
            let requeued = self.leads.requeue_daily_skipped(campaign.id).await?;
            if requeued > 0 {
                info!(campaign_id = %campaign.id, requeued, "Requeued daily-capped leads");
            }
            resume = None;
        }

        let remaining_today = campaign.remaining_today(today);
        if remaining_today == 0 {
            debug!(campaign_id = %campaign.id, "Daily limit reached");
            return Ok(());
        }

        let base = (schedule.batch_size as f64 * decision.rate_multiplier).floor() as i64;
        let mut limit = base.max(1).min(remaining_today as i64);
        if let Some(ceiling) = campaign.remaining_under_ceiling() {
            if ceiling == 0 {
                if self
                    .campaigns
                    .update_status(campaign.id, CampaignStatus::Running, CampaignStatus::Completed)
                    .await?
                {
                    info!(campaign_id = %campaign.id, "Campaign reached its lead ceiling");
                }
                return Ok(());
            }
            limit = limit.min(ceiling);
        }

        let page = self
            .leads
            .fetch_eligible(campaign.id, &campaign.lead_selection, limit, resume)
            .await?;

        if page.is_empty() {
            if resume.is_some() {
                // Wrap the cursor; the next cycle rescans from the start and
                // picks up leads requeued behind it.
                self.campaigns.persist_cycle(campaign.id, 0, None).await?;
                return Ok(());
            }
            let eligible = self
                .leads
                .count_eligible(campaign.id, &campaign.lead_selection)
                .await?;
            if eligible == 0
                && !schedule.has_date_after(today)
                && self
                    .campaigns
                    .update_status(campaign.id, CampaignStatus::Running, CampaignStatus::Completed)
                    .await?
            {
                info!(campaign_id = %campaign.id, "Campaign completed");
            }
            return Ok(());
        }

        let max_position = page.iter().map(|l| l.position).max().unwrap_or(0);
        let (verified, unverified): (Vec<Lead>, Vec<Lead>) = page
            .into_iter()
            .partition(|l| l.status == LeadStatus::Verified);

        // Unverified leads go to the verification queue and do not count
        // against the daily cap. The verifier flips them to Verified; the
        // queue is at-least-once, so a re-enqueue after a cursor wrap is
        // harmless.
        if !unverified.is_empty() {
            let jobs: Vec<VerificationJob> = unverified
                .iter()
                .map(|l| VerificationJob {
                    lead_id: l.id,
                    campaign_id: campaign.id,
                })
                .collect();
            let count = jobs.len();
            self.verification.enqueue_batch(jobs).await?;
            self.metrics.verification_enqueued_total.inc_by(count as u64);
            debug!(campaign_id = %campaign.id, count, "Enqueued leads for verification");
        }

        let claimed = if verified.is_empty() {
            Vec::new()
        } else {
            let ids: Vec<_> = verified.iter().map(|l| l.id).collect();
            let claimed = self
                .leads
                .claim_batch(&ids, LeadStatus::Verified, LeadStatus::Sent)
                .await?;
            let lost = ids.len() - claimed.len();
            if lost > 0 {
                self.metrics.claim_conflicts_total.inc_by(lost as u64);
                debug!(campaign_id = %campaign.id, lost, "Lost lead claims to an overlapping cycle");
            }
            claimed
        };

        if claimed.is_empty() {
            self.campaigns
                .persist_cycle(campaign.id, 0, Some(max_position))
                .await?;
            return Ok(());
        }

        let n = claimed.len() as i32;
        let reserved = self
            .campaigns
            .reserve_daily_capacity(campaign.id, n, schedule.daily_limit, today)
            .await?;
        if !reserved {
            // An overlapping cycle consumed the capacity after we claimed.
            // Park the claims; the next local day requeues them.
            warn!(campaign_id = %campaign.id, n, "Daily capacity reservation refused");
            let updates = claimed
                .iter()
                .map(|id| LeadUpdate::new(*id, LeadStatus::SkippedDailyCap))
                .collect();
            let outcome = self.leads.write_batch(updates).await?;
            if !outcome.all_written() {
                warn!(
                    campaign_id = %campaign.id,
                    unprocessed_ids = ?outcome.unprocessed,
                    "Some parked leads could not be written"
                );
            }
            self.campaigns
                .persist_cycle(campaign.id, 0, Some(max_position))
                .await?;
            return Ok(());
        }

        let claimed_set: HashSet<_> = claimed.iter().copied().collect();
        let to_send: Vec<&Lead> = verified
            .iter()
            .filter(|l| claimed_set.contains(&l.id))
            .collect();

        // ThreadRng is not Send; sample every offset before the enqueue await.
        let offsets = {
            let mut rng = rand::thread_rng();
            pacing::cumulative_offsets(&campaign.delay_config.0, to_send.len(), &mut rng)
        };

        let jobs: Vec<DeliveryJob> = to_send
            .iter()
            .zip(offsets)
            .map(|(lead, delay_ms)| DeliveryJob {
                lead_id: lead.id,
                campaign_id: campaign.id,
                rendered_message_ref: campaign.template_ref.clone(),
                delay_ms,
            })
            .collect();

        if let Err(e) = self.delivery.enqueue_batch(jobs).await {
            // Release the claims so the next cycle retries them. The
            // reserved capacity is not returned; the cap errs low.
            error!(campaign_id = %campaign.id, error = %e, "Delivery enqueue failed, releasing claims");
            let updates = claimed
                .iter()
                .map(|id| LeadUpdate::new(*id, LeadStatus::Verified))
                .collect();
            let outcome = self.leads.write_batch(updates).await?;
            if !outcome.all_written() {
                warn!(
                    campaign_id = %campaign.id,
                    unprocessed_ids = ?outcome.unprocessed,
                    "Some claim releases could not be written"
                );
            }
            return Err(e);
        }

        self.metrics.leads_dispatched_total.inc_by(n as u64);
        self.campaigns
            .persist_cycle(campaign.id, n, Some(max_position))
            .await?;

        info!(
            campaign_id = %campaign.id,
            sent = n,
            rate_multiplier = decision.rate_multiplier,
            "Dispatched batch"
        );
        Ok(())
    }

    /// Move aborting campaigns to their terminal state once nothing is in
    /// flight for them.
    async fn finalize_aborting(&self) -> Result<()> {
        let aborting = self.campaigns.list_by_status(CampaignStatus::Aborting).await?;
        for campaign in aborting {
            let in_flight = self
                .leads
                .count_eligible(campaign.id, &in_flight_selection())
                .await?;
            if in_flight == 0
                && self
                    .campaigns
                    .update_status(campaign.id, CampaignStatus::Aborting, CampaignStatus::Aborted)
                    .await?
            {
                info!(campaign_id = %campaign.id, "Campaign aborted");
            }
        }
        Ok(())
    }
}

fn in_flight_selection() -> LeadSelection {
    LeadSelection {
        lead_types: BTreeSet::new(),
        statuses: vec![LeadStatus::Sent],
        max_leads: None,
    }
}
