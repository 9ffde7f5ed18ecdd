//! Schedule window evaluator
//!
//! Pure function of (schedule, now): identical inputs always produce an
//! identical decision, which keeps timezone and DST behavior testable.
//! Midnight-crossing windows are rejected when the campaign is queued,
//! never handled here.

use chrono::{DateTime, NaiveDate, Utc};
use leadflow_common::Result;
use leadflow_storage::models::CampaignSchedule;

/// Whether and how fast a campaign may send right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowDecision {
    pub allowed: bool,
    pub rate_multiplier: f64,
}

impl WindowDecision {
    fn closed() -> Self {
        Self {
            allowed: false,
            rate_multiplier: 1.0,
        }
    }
}

/// The current calendar date in the campaign's timezone.
pub fn local_today(schedule: &CampaignSchedule, now_utc: DateTime<Utc>) -> Result<NaiveDate> {
    let tz = schedule.tz()?;
    Ok(now_utc.with_timezone(&tz).date_naive())
}

/// Evaluate the sending window for a campaign at a point in time.
pub fn evaluate(schedule: &CampaignSchedule, now_utc: DateTime<Utc>) -> Result<WindowDecision> {
    let tz = schedule.tz()?;
    let local = now_utc.with_timezone(&tz);
    let today = local.date_naive();
    let time = local.time();

    // Campaigns send only on pre-approved dates, not arbitrary days.
    if !schedule.scheduled_dates.contains(&today) {
        return Ok(WindowDecision::closed());
    }

    if !schedule.working_hours.contains(time) {
        return Ok(WindowDecision::closed());
    }

    let rate_multiplier = schedule
        .peak_hours
        .as_ref()
        .filter(|peak| peak.start <= time && time < peak.end)
        .map(|peak| peak.multiplier)
        .unwrap_or(1.0);

    Ok(WindowDecision {
        allowed: true,
        rate_multiplier,
    })
}
