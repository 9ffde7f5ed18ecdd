//! In-memory store and queue doubles for orchestrator tests.
//!
//! Every trait method bumps a call counter so tests can assert the
//! store-call ceilings the dispatch cycle is designed around.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use leadflow_common::types::{CampaignId, LeadId, MetricsDelta};
use leadflow_common::{Error, Result};
use leadflow_storage::batch::BatchOutcome;
use leadflow_storage::models::{
    AccountTotals, Campaign, CampaignSchedule, CampaignStatus, DelayConfig, Lead, LeadSelection,
    LeadStatus, LeadUpdate, NewCampaign, TimeWindow,
};
use leadflow_storage::repository::{CampaignStore, LeadStore};
use sqlx::types::Json;
use uuid::Uuid;

use crate::feedback::{ReputationService, ReputationStatus};
use crate::queue::{DeliveryJob, DeliveryQueue, VerificationJob, VerificationQueue};

#[derive(Default)]
pub struct InMemoryCampaignStore {
    pub campaigns: Mutex<HashMap<CampaignId, Campaign>>,
    pub totals: Mutex<AccountTotals>,
    pub calls: AtomicUsize,
    pub refuse_reserve: AtomicBool,
}

impl InMemoryCampaignStore {
    pub fn with_campaigns(campaigns: Vec<Campaign>) -> Self {
        let store = Self::default();
        {
            let mut map = store.campaigns.lock().unwrap();
            for c in campaigns {
                map.insert(c.id, c);
            }
        }
        store
    }

    pub fn status_of(&self, id: CampaignId) -> CampaignStatus {
        self.campaigns.lock().unwrap()[&id].status
    }

    pub fn get_sync(&self, id: CampaignId) -> Campaign {
        self.campaigns.lock().unwrap()[&id].clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn create(&self, input: NewCampaign) -> Result<Campaign> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let campaign = campaign_from_parts(
            Uuid::new_v4(),
            input.name,
            input.template_ref,
            input.schedule,
            input.delay_config,
            input.lead_selection,
        );
        self.campaigns
            .lock()
            .unwrap()
            .insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.campaigns.lock().unwrap().get(&id).cloned())
    }

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut campaigns: Vec<Campaign> = self
            .campaigns
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect();
        campaigns.sort_by_key(|c| c.created_at);
        Ok(campaigns)
    }

    async fn update_status(
        &self,
        id: CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut map = self.campaigns.lock().unwrap();
        match map.get_mut(&id) {
            Some(c) if c.status == from => {
                c.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reserve_daily_capacity(
        &self,
        id: CampaignId,
        n: i32,
        daily_limit: i32,
        today_local: NaiveDate,
    ) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse_reserve.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let mut map = self.campaigns.lock().unwrap();
        let c = map
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let base = if c.last_sent_date == Some(today_local) {
            c.sent_today
        } else {
            0
        };
        if base + n <= daily_limit {
            c.sent_today = base + n;
            c.last_sent_date = Some(today_local);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn persist_cycle(
        &self,
        id: CampaignId,
        sent_delta: i32,
        resume_position: Option<i64>,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut map = self.campaigns.lock().unwrap();
        let c = map
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        c.sent_count += sent_delta;
        c.resume_position = resume_position;
        Ok(())
    }

    async fn apply_feedback(&self, id: CampaignId, delta: &MetricsDelta) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut map = self.campaigns.lock().unwrap();
        let c = map
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        c.delivered_count += delta.delivered;
        c.bounced_count += delta.bounced;
        c.complained_count += delta.complained;
        c.failed_count += delta.failed;
        Ok(())
    }

    async fn account_totals(&self) -> Result<AccountTotals> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.totals.lock().unwrap())
    }
}

#[derive(Default)]
pub struct InMemoryLeadStore {
    pub leads: Mutex<HashMap<LeadId, Lead>>,
    pub calls: AtomicUsize,
    /// Ids an overlapping cycle "won"; claims against them fail once.
    pub lose_next_claims: Mutex<Vec<LeadId>>,
}

impl InMemoryLeadStore {
    pub fn with_leads(leads: Vec<Lead>) -> Self {
        let store = Self::default();
        {
            let mut map = store.leads.lock().unwrap();
            for lead in leads {
                map.insert(lead.id, lead);
            }
        }
        store
    }

    pub fn status_of(&self, id: LeadId) -> LeadStatus {
        self.leads.lock().unwrap()[&id].status
    }

    pub fn count_with_status(&self, status: LeadStatus) -> usize {
        self.leads
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.status == status)
            .count()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn matches(lead: &Lead, campaign_id: CampaignId, selection: &LeadSelection) -> bool {
        lead.campaign_id == Some(campaign_id)
            && selection.statuses.contains(&lead.status)
            && (selection.lead_types.is_empty() || selection.lead_types.contains(&lead.lead_type))
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn claim(&self, lead_id: LeadId, expected: LeadStatus, new: LeadStatus) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut map = self.leads.lock().unwrap();
        match map.get_mut(&lead_id) {
            Some(lead) if lead.status == expected => {
                lead.status = new;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_batch(
        &self,
        lead_ids: &[LeadId],
        expected: LeadStatus,
        new: LeadStatus,
    ) -> Result<Vec<LeadId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut lost = self.lose_next_claims.lock().unwrap();
        let mut map = self.leads.lock().unwrap();
        let mut claimed = Vec::new();
        for id in lead_ids {
            if let Some(pos) = lost.iter().position(|l| l == id) {
                lost.remove(pos);
                continue;
            }
            if let Some(lead) = map.get_mut(id) {
                if lead.status == expected {
                    lead.status = new;
                    claimed.push(*id);
                }
            }
        }
        Ok(claimed)
    }

    async fn write_batch(&self, updates: Vec<LeadUpdate>) -> Result<BatchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut map = self.leads.lock().unwrap();
        let mut written = Vec::new();
        for update in updates {
            if let Some(lead) = map.get_mut(&update.lead_id) {
                lead.status = update.status;
                lead.last_error = update.last_error;
            }
            written.push(update.lead_id);
        }
        Ok(BatchOutcome {
            written,
            unprocessed: vec![],
        })
    }

    async fn fetch_eligible(
        &self,
        campaign_id: CampaignId,
        selection: &LeadSelection,
        limit: i64,
        after_position: Option<i64>,
    ) -> Result<Vec<Lead>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let after = after_position.unwrap_or(0);
        let mut eligible: Vec<Lead> = self
            .leads
            .lock()
            .unwrap()
            .values()
            .filter(|l| Self::matches(l, campaign_id, selection) && l.position > after)
            .cloned()
            .collect();
        eligible.sort_by_key(|l| l.position);
        eligible.truncate(limit.max(0) as usize);
        Ok(eligible)
    }

    async fn count_eligible(
        &self,
        campaign_id: CampaignId,
        selection: &LeadSelection,
    ) -> Result<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .leads
            .lock()
            .unwrap()
            .values()
            .filter(|l| Self::matches(l, campaign_id, selection))
            .count() as i64)
    }

    async fn find_by_message_id(&self, provider_message_id: &str) -> Result<Option<Lead>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .leads
            .lock()
            .unwrap()
            .values()
            .find(|l| l.provider_message_id.as_deref() == Some(provider_message_id))
            .cloned())
    }

    async fn requeue_daily_skipped(&self, campaign_id: CampaignId) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut count = 0;
        for lead in self.leads.lock().unwrap().values_mut() {
            if lead.campaign_id == Some(campaign_id) && lead.status == LeadStatus::SkippedDailyCap {
                lead.status = LeadStatus::Queued;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn mark_unsubscribed(&self, lead_ids: &[LeadId]) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut map = self.leads.lock().unwrap();
        let mut count = 0;
        for id in lead_ids {
            if let Some(lead) = map.get_mut(id) {
                if !lead.status.is_terminal() {
                    lead.status = LeadStatus::Unsubscribed;
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

#[derive(Default)]
pub struct RecordingDeliveryQueue {
    pub jobs: Mutex<Vec<DeliveryJob>>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl RecordingDeliveryQueue {
    pub fn enqueued(&self) -> Vec<DeliveryJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryQueue for RecordingDeliveryQueue {
    async fn enqueue_batch(&self, jobs: Vec<DeliveryJob>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Queue("delivery queue unavailable".to_string()));
        }
        self.jobs.lock().unwrap().extend(jobs);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingVerificationQueue {
    pub jobs: Mutex<Vec<VerificationJob>>,
    pub calls: AtomicUsize,
}

impl RecordingVerificationQueue {
    pub fn enqueued(&self) -> Vec<VerificationJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl VerificationQueue for RecordingVerificationQueue {
    async fn enqueue_batch(&self, jobs: Vec<VerificationJob>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().unwrap().extend(jobs);
        Ok(())
    }
}

pub struct StubReputation {
    pub status: Mutex<ReputationStatus>,
    pub calls: AtomicUsize,
}

impl StubReputation {
    pub fn healthy() -> Self {
        Self {
            status: Mutex::new(ReputationStatus::Healthy),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn poor() -> Self {
        Self {
            status: Mutex::new(ReputationStatus::Poor),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReputationService for StubReputation {
    async fn check(&self) -> Result<ReputationStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.status.lock().unwrap())
    }
}

fn campaign_from_parts(
    id: CampaignId,
    name: String,
    template_ref: String,
    schedule: CampaignSchedule,
    delay_config: DelayConfig,
    lead_selection: LeadSelection,
) -> Campaign {
    let now = Utc::now();
    Campaign {
        id,
        name,
        status: CampaignStatus::Draft,
        template_ref,
        schedule: Json(schedule),
        delay_config: Json(delay_config),
        lead_selection: Json(lead_selection),
        sent_count: 0,
        delivered_count: 0,
        bounced_count: 0,
        complained_count: 0,
        failed_count: 0,
        verification_passed_count: 0,
        verification_failed_count: 0,
        sent_today: 0,
        last_sent_date: None,
        resume_position: None,
        created_at: now,
        updated_at: now,
    }
}

/// UTC schedule open for the whole of `date` with no delay between sends.
pub fn open_schedule(date: NaiveDate, daily_limit: i32, batch_size: i32) -> CampaignSchedule {
    CampaignSchedule {
        timezone: "UTC".to_string(),
        working_hours: TimeWindow {
            start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
        },
        peak_hours: None,
        scheduled_dates: [date].into_iter().collect(),
        daily_limit,
        batch_size,
    }
}

pub fn zero_delay() -> DelayConfig {
    DelayConfig {
        min_delay_ms: 0,
        max_delay_ms: 0,
        gaussian: false,
    }
}

/// A Running campaign with an open UTC window on `date`.
pub fn running_campaign(date: NaiveDate, daily_limit: i32, batch_size: i32) -> Campaign {
    let mut campaign = campaign_from_parts(
        Uuid::new_v4(),
        "spring outreach".to_string(),
        "tmpl-001".to_string(),
        open_schedule(date, daily_limit, batch_size),
        zero_delay(),
        LeadSelection::default(),
    );
    campaign.status = CampaignStatus::Running;
    campaign
}

pub fn lead(campaign_id: CampaignId, status: LeadStatus, position: i64) -> Lead {
    let now = Utc::now();
    Lead {
        id: Uuid::new_v4(),
        campaign_id: Some(campaign_id),
        email: format!("lead{}@example.com", position),
        name: None,
        company: None,
        lead_type: "contact".to_string(),
        status,
        position,
        provider_message_id: None,
        last_error: None,
        created_at: now,
        updated_at: now,
    }
}

mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_claims_have_exactly_one_winner() {
        let l = lead(Uuid::new_v4(), LeadStatus::Queued, 1);
        let id = l.id;
        let store = Arc::new(InMemoryLeadStore::with_leads(vec![l]));

        let first = tokio::spawn({
            let store = store.clone();
            async move { store.claim(id, LeadStatus::Queued, LeadStatus::Sent).await }
        });
        let second = tokio::spawn({
            let store = store.clone();
            async move { store.claim(id, LeadStatus::Queued, LeadStatus::Sent).await }
        });

        let a = first.await.unwrap().unwrap();
        let b = second.await.unwrap().unwrap();
        assert!(a ^ b, "exactly one of two overlapping claims must win");
        assert_eq!(store.status_of(id), LeadStatus::Sent);
    }

    #[tokio::test]
    async fn test_concurrent_claim_batches_split_without_overlap() {
        let campaign_id = Uuid::new_v4();
        let leads: Vec<Lead> = (1..=10)
            .map(|pos| lead(campaign_id, LeadStatus::Verified, pos))
            .collect();
        let ids: Vec<LeadId> = leads.iter().map(|l| l.id).collect();
        let store = Arc::new(InMemoryLeadStore::with_leads(leads));

        let first = tokio::spawn({
            let (store, ids) = (store.clone(), ids.clone());
            async move {
                store
                    .claim_batch(&ids, LeadStatus::Verified, LeadStatus::Sent)
                    .await
            }
        });
        let second = tokio::spawn({
            let (store, ids) = (store.clone(), ids.clone());
            async move {
                store
                    .claim_batch(&ids, LeadStatus::Verified, LeadStatus::Sent)
                    .await
            }
        });

        let won_first = first.await.unwrap().unwrap();
        let won_second = second.await.unwrap().unwrap();

        // Every lead claimed exactly once across both callers.
        assert_eq!(won_first.len() + won_second.len(), 10);
        for id in &won_first {
            assert!(!won_second.contains(id), "lead {id} claimed twice");
        }
        assert_eq!(store.count_with_status(LeadStatus::Sent), 10);
    }
}
