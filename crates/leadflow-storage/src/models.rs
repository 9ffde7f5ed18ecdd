//! Database models

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use leadflow_common::types::{CampaignId, LeadId};
use leadflow_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "campaign_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Queued,
    Running,
    Paused,
    Aborting,
    Aborted,
    Completed,
    Error,
}

impl CampaignStatus {
    /// Terminal campaign states may only restart as a fresh draft copy.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Aborted | CampaignStatus::Completed)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Queued => write!(f, "queued"),
            CampaignStatus::Running => write!(f, "running"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Aborting => write!(f, "aborting"),
            CampaignStatus::Aborted => write!(f, "aborted"),
            CampaignStatus::Completed => write!(f, "completed"),
            CampaignStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "queued" => Ok(CampaignStatus::Queued),
            "running" => Ok(CampaignStatus::Running),
            "paused" => Ok(CampaignStatus::Paused),
            "aborting" => Ok(CampaignStatus::Aborting),
            "aborted" => Ok(CampaignStatus::Aborted),
            "completed" => Ok(CampaignStatus::Completed),
            "error" => Ok(CampaignStatus::Error),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Lead status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    PendingImport,
    Queued,
    Verified,
    Sent,
    Delivered,
    Bounced,
    Complained,
    Failed,
    SkippedDailyCap,
    Unsubscribed,
}

impl sqlx::postgres::PgHasArrayType for LeadStatus {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("_lead_status")
    }
}

impl LeadStatus {
    /// Terminal lead states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LeadStatus::Delivered
                | LeadStatus::Bounced
                | LeadStatus::Complained
                | LeadStatus::Unsubscribed
        )
    }

    /// Recoverable states may re-enter the queue.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LeadStatus::Failed | LeadStatus::SkippedDailyCap)
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadStatus::PendingImport => write!(f, "pending_import"),
            LeadStatus::Queued => write!(f, "queued"),
            LeadStatus::Verified => write!(f, "verified"),
            LeadStatus::Sent => write!(f, "sent"),
            LeadStatus::Delivered => write!(f, "delivered"),
            LeadStatus::Bounced => write!(f, "bounced"),
            LeadStatus::Complained => write!(f, "complained"),
            LeadStatus::Failed => write!(f, "failed"),
            LeadStatus::SkippedDailyCap => write!(f, "skipped_daily_cap"),
            LeadStatus::Unsubscribed => write!(f, "unsubscribed"),
        }
    }
}

/// Delivery outcome reported by the transport collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "delivery_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Bounced,
    Complained,
    Unsubscribed,
}

/// A local time-of-day window. Start must be strictly before end; windows
/// crossing midnight are rejected at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn contains(&self, t: NaiveTime) -> bool {
        self.start <= t && t < self.end
    }
}

/// Higher-throughput sub-window within working hours
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub multiplier: f64,
}

/// Campaign sending schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSchedule {
    /// IANA timezone name, e.g. "America/New_York"
    pub timezone: String,
    pub working_hours: TimeWindow,
    pub peak_hours: Option<PeakWindow>,
    /// Explicit set of calendar dates on which sending is allowed.
    pub scheduled_dates: BTreeSet<NaiveDate>,
    pub daily_limit: i32,
    pub batch_size: i32,
}

impl CampaignSchedule {
    /// Parse the configured timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| Error::Validation(format!("Unknown timezone: {}", self.timezone)))
    }

    /// Whether any scheduled date remains strictly after the given local date
    pub fn has_date_after(&self, date: NaiveDate) -> bool {
        self.scheduled_dates.iter().any(|d| *d > date)
    }

    /// Validate the schedule. Called when a campaign is queued, never by the
    /// window evaluator.
    pub fn validate(&self) -> Result<()> {
        self.tz()?;

        if self.working_hours.start >= self.working_hours.end {
            return Err(Error::Validation(
                "Working hours start must be strictly before end (windows crossing midnight are not supported)"
                    .to_string(),
            ));
        }

        if let Some(peak) = &self.peak_hours {
            if peak.start >= peak.end {
                return Err(Error::Validation(
                    "Peak hours start must be strictly before end".to_string(),
                ));
            }
            if peak.start < self.working_hours.start || peak.end > self.working_hours.end {
                return Err(Error::Validation(
                    "Peak hours must fall within working hours".to_string(),
                ));
            }
            if !peak.multiplier.is_finite() || peak.multiplier < 1.0 {
                return Err(Error::Validation(
                    "Peak multiplier must be a finite value >= 1.0".to_string(),
                ));
            }
        }

        if self.scheduled_dates.is_empty() {
            return Err(Error::Validation(
                "Campaign has no scheduled sending dates".to_string(),
            ));
        }

        if self.daily_limit <= 0 {
            return Err(Error::Validation("Daily limit must be positive".to_string()));
        }

        if self.batch_size <= 0 {
            return Err(Error::Validation("Batch size must be positive".to_string()));
        }

        Ok(())
    }
}

/// Inter-send delay configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Gaussian delays cluster around the band midpoint; uniform delays
    /// spread evenly across it.
    pub gaussian: bool,
}

impl DelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(Error::Validation(
                "Minimum delay must not exceed maximum delay".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_selection_statuses() -> Vec<LeadStatus> {
    vec![LeadStatus::Queued, LeadStatus::Verified]
}

/// Lead selection criteria for a campaign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSelection {
    /// Lead types to include; empty means all types.
    #[serde(default)]
    pub lead_types: BTreeSet<String>,

    /// Eligible lead statuses.
    #[serde(default = "default_selection_statuses")]
    pub statuses: Vec<LeadStatus>,

    /// Ceiling on total leads the campaign will ever send to.
    #[serde(default)]
    pub max_leads: Option<i64>,
}

impl Default for LeadSelection {
    fn default() -> Self {
        Self {
            lead_types: BTreeSet::new(),
            statuses: default_selection_statuses(),
            max_leads: None,
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub status: CampaignStatus,
    /// Opaque reference to the rendered message template, passed through
    /// to the delivery queue.
    pub template_ref: String,
    pub schedule: Json<CampaignSchedule>,
    pub delay_config: Json<DelayConfig>,
    pub lead_selection: Json<LeadSelection>,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub bounced_count: i32,
    pub complained_count: i32,
    pub failed_count: i32,
    pub verification_passed_count: i32,
    pub verification_failed_count: i32,
    /// Valid only for the current local calendar day; stale values are
    /// reset when `last_sent_date` differs from today.
    pub sent_today: i32,
    pub last_sent_date: Option<NaiveDate>,
    /// Cursor into the lead assignment order; lets a cycle continue where
    /// the previous one stopped instead of re-scanning from the start.
    pub resume_position: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Sends still permitted today, accounting for day rollover.
    pub fn remaining_today(&self, today_local: NaiveDate) -> i32 {
        let sent_today = if self.last_sent_date == Some(today_local) {
            self.sent_today
        } else {
            0
        };
        (self.schedule.daily_limit - sent_today).max(0)
    }

    /// Leads still permitted under the selection ceiling, if configured.
    pub fn remaining_under_ceiling(&self) -> Option<i64> {
        self.lead_selection
            .max_leads
            .map(|max| (max - self.sent_count as i64).max(0))
    }
}

/// New campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCampaign {
    pub name: String,
    pub template_ref: String,
    pub schedule: CampaignSchedule,
    pub delay_config: DelayConfig,
    pub lead_selection: LeadSelection,
}

/// Lead model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub campaign_id: Option<CampaignId>,
    pub email: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub lead_type: String,
    pub status: LeadStatus,
    /// Assignment-order sort key; cycles page through leads by position so
    /// repeated cycles make forward progress.
    pub position: i64,
    pub provider_message_id: Option<String>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One item of a batch status write
#[derive(Debug, Clone)]
pub struct LeadUpdate {
    pub lead_id: LeadId,
    pub status: LeadStatus,
    pub last_error: Option<String>,
}

impl LeadUpdate {
    pub fn new(lead_id: LeadId, status: LeadStatus) -> Self {
        Self {
            lead_id,
            status,
            last_error: None,
        }
    }

    pub fn with_error(lead_id: LeadId, status: LeadStatus, error: impl Into<String>) -> Self {
        Self {
            lead_id,
            status,
            last_error: Some(error.into()),
        }
    }
}

/// Delivery outcome event emitted by the transport collaborator
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub id: Uuid,
    pub provider_message_id: String,
    pub outcome: DeliveryOutcome,
    /// "hard" or "soft" for bounces
    pub bounce_type: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// New delivery event input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeliveryEvent {
    pub provider_message_id: String,
    pub outcome: DeliveryOutcome,
    pub bounce_type: Option<String>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Account-wide send totals used by the reputation service
#[derive(Debug, Clone, Copy, Default, FromRow)]
pub struct AccountTotals {
    pub sent: i64,
    pub bounced: i64,
    pub complained: i64,
}

impl AccountTotals {
    pub fn bounce_rate(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.bounced as f64 / self.sent as f64
        }
    }

    pub fn complaint_rate(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            self.complained as f64 / self.sent as f64
        }
    }
}
