//! Billing job DTOs

use chrono::{DateTime, Utc};
use classbill_core::models::{BillingJobState, RepeatInterval, ScheduledJob};
use classbill_core::AppResult;
use classbill_services::{SweepOutcome, SweepReport};
use serde::Serialize;
use uuid::Uuid;

/// One supervised listing as seen by operators
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BillingJobResponse {
    pub job_id: String,
    pub listing_id: Uuid,
    pub failure_count: u32,
    pub next_fire_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatInterval>,
    pub updated_at: DateTime<Utc>,
}

impl BillingJobResponse {
    /// Decode the billing state carried in a job
    pub fn from_job(job: ScheduledJob) -> AppResult<Self> {
        let state = BillingJobState::from_payload(&job.payload)?;
        Ok(Self {
            job_id: job.id,
            listing_id: state.listing_id,
            failure_count: state.failure_count,
            next_fire_at: job.next_fire_at,
            repeat: job.repeat,
            updated_at: job.updated_at,
        })
    }
}

/// Result of a manually triggered sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SweepReport>,
}

impl From<SweepOutcome> for SweepResponse {
    fn from(outcome: SweepOutcome) -> Self {
        match outcome {
            SweepOutcome::Completed(report) => Self {
                status: "completed",
                report: Some(report),
            },
            SweepOutcome::AlreadyRunning => Self {
                status: "already_running",
                report: None,
            },
            SweepOutcome::Skipped => Self {
                status: "skipped",
                report: None,
            },
        }
    }
}
