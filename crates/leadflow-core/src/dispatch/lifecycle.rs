//! Campaign lifecycle service
//!
//! Thin orchestration over the state machine: every status change is
//! validated against the transition table, then applied with a
//! conditional write so concurrent operators cannot double-apply.

use std::sync::Arc;

use leadflow_common::types::CampaignId;
use leadflow_common::{Error, Result};
use leadflow_storage::models::{Campaign, CampaignStatus, NewCampaign};
use leadflow_storage::repository::CampaignStore;
use tracing::info;

use crate::dispatch::state;

pub struct CampaignLifecycle {
    campaigns: Arc<dyn CampaignStore>,
}

impl CampaignLifecycle {
    pub fn new(campaigns: Arc<dyn CampaignStore>) -> Self {
        Self { campaigns }
    }

    /// Create a new draft campaign. Configuration is validated up front so
    /// a broken schedule never reaches the store.
    pub async fn create(&self, input: NewCampaign) -> Result<Campaign> {
        input.schedule.validate()?;
        input.delay_config.validate()?;
        let campaign = self.campaigns.create(input).await?;
        info!(campaign_id = %campaign.id, name = %campaign.name, "Campaign created");
        Ok(campaign)
    }

    /// Queue a draft for dispatch. The schedule is re-validated here; a
    /// draft edited into an invalid state stays a draft.
    pub async fn queue(&self, id: CampaignId) -> Result<()> {
        let campaign = self.require(id).await?;
        campaign.schedule.validate()?;
        campaign.delay_config.validate()?;
        self.apply(&campaign, CampaignStatus::Queued).await
    }

    pub async fn start(&self, id: CampaignId) -> Result<()> {
        let campaign = self.require(id).await?;
        self.apply(&campaign, CampaignStatus::Running).await
    }

    pub async fn pause(&self, id: CampaignId) -> Result<()> {
        let campaign = self.require(id).await?;
        self.apply(&campaign, CampaignStatus::Paused).await
    }

    pub async fn resume(&self, id: CampaignId) -> Result<()> {
        let campaign = self.require(id).await?;
        self.apply(&campaign, CampaignStatus::Running).await
    }

    /// Abort a campaign. Running campaigns pass through `Aborting` so the
    /// dispatch worker can drain in-flight sends; everything else that the
    /// table allows drops straight to `Aborted`.
    pub async fn abort(&self, id: CampaignId) -> Result<()> {
        let campaign = self.require(id).await?;
        let target = if campaign.status == CampaignStatus::Running {
            CampaignStatus::Aborting
        } else {
            CampaignStatus::Aborted
        };
        self.apply(&campaign, target).await
    }

    /// Restart a finished campaign as a fresh draft copy. The original is
    /// left untouched; counters and cursors start from zero.
    pub async fn restart_as_draft(&self, id: CampaignId) -> Result<Campaign> {
        let campaign = self.require(id).await?;
        state::transition(campaign.status, CampaignStatus::Draft)?;

        let copy = self
            .campaigns
            .create(NewCampaign {
                name: campaign.name.clone(),
                template_ref: campaign.template_ref.clone(),
                schedule: campaign.schedule.0.clone(),
                delay_config: campaign.delay_config.0,
                lead_selection: campaign.lead_selection.0.clone(),
            })
            .await?;
        info!(
            campaign_id = %copy.id,
            source_id = %campaign.id,
            "Campaign restarted as draft"
        );
        Ok(copy)
    }

    async fn require(&self, id: CampaignId) -> Result<Campaign> {
        self.campaigns
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {id}")))
    }

    async fn apply(&self, campaign: &Campaign, to: CampaignStatus) -> Result<()> {
        let from = campaign.status;
        state::transition(from, to)?;

        if !self.campaigns.update_status(campaign.id, from, to).await? {
            // Someone else moved the campaign between our read and write.
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        info!(campaign_id = %campaign.id, %from, %to, "Campaign status changed");
        Ok(())
    }
}
