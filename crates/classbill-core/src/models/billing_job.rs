//! Billing job payload
//!
//! The collector stores its retry state inside the scheduler's opaque job
//! payload. The listing key is named after the job kind so payloads written
//! before failure counting existed still decode.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::AppResult;

/// Scheduler kind tag for classified billing jobs
pub const BILLING_JOB_KIND: &str = "CLASSBILL";

/// Retry state for one supervised listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingJobState {
    /// Listing being billed; fixed for the job's whole life
    #[serde(rename = "CLASSBILL")]
    pub listing_id: Uuid,

    /// Consecutive failed charges since the last success
    #[serde(rename = "FailureCount", default)]
    pub failure_count: u32,
}

impl BillingJobState {
    /// Fresh state for a newly supervised listing
    pub fn new(listing_id: Uuid) -> Self {
        Self {
            listing_id,
            failure_count: 0,
        }
    }

    /// Scheduler key for this listing's job
    pub fn job_key(&self) -> String {
        self.listing_id.to_string()
    }

    /// State after one more failed charge
    pub fn with_failure(self) -> Self {
        Self {
            failure_count: self.failure_count.saturating_add(1),
            ..self
        }
    }

    /// State after a successful charge
    pub fn reset(self) -> Self {
        Self {
            failure_count: 0,
            ..self
        }
    }

    /// Encode as a scheduler payload
    pub fn to_payload(&self) -> AppResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode from a scheduler payload
    pub fn from_payload(payload: &serde_json::Value) -> AppResult<Self> {
        serde_json::from_value(payload.clone())
            .map_err(|e| AppError::InvalidPayload(format!("billing job payload: {}", e)))
    }
}
