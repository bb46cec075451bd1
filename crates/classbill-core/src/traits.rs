//! Collaborator traits
//!
//! The collector depends on four external services: the directory's listing
//! store, the scheduler's job table, the money ledger and notification
//! delivery. Each is abstracted here so the billing policy can be exercised
//! against any backend.

use crate::error::AppError;
use crate::models::{
    Classified, ClassifiedCategory, ClassifiedFlags, ListingSummary, ScheduledJob,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Number of listings returned per directory page
pub const LISTING_PAGE_SIZE: i64 = 50;

/// Directory listing store
#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// One page of listings matching `category` whose flags contain `flags`
    ///
    /// Pages are ordered by a stable key so that advancing `offset` by the
    /// length of the previous page walks every listing exactly once.
    async fn find_enabled(
        &self,
        category: ClassifiedCategory,
        flags: ClassifiedFlags,
        offset: i64,
    ) -> Result<Vec<ListingSummary>, AppError>;

    /// Find listing by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Classified>, AppError>;

    /// Persist the listing's flags
    async fn persist(&self, listing: &Classified) -> Result<(), AppError>;
}

/// Scheduler job storage
///
/// At most one job is stored per key.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Check if a job with this key exists
    async fn exists(&self, job_id: &str) -> Result<bool, AppError>;

    /// Find job by key
    async fn find_by_id(&self, job_id: &str) -> Result<Option<ScheduledJob>, AppError>;

    /// Create or replace the job stored under `job.id`
    async fn save(&self, job: &ScheduledJob) -> Result<(), AppError>;

    /// Delete a job; returns whether one existed
    async fn remove(&self, job_id: &str) -> Result<bool, AppError>;

    /// Claim jobs of the given kinds due at `now`
    ///
    /// Jobs of any other kind are left untouched. Claimed jobs are already advanced to their next fire time (run-once
    /// jobs are deleted) before they are returned, so a crash while a handler
    /// runs never fires the same due time twice. Returned records carry the
    /// advanced `next_fire_at`.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        kinds: &[String],
        limit: i64,
    ) -> Result<Vec<ScheduledJob>, AppError>;

    /// List jobs, optionally filtered by kind, with total count
    async fn list(
        &self,
        kind: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ScheduledJob>, i64), AppError>;
}

/// Handler invoked when a job of a registered kind fires
///
/// Handlers deal with their own failures; nothing is returned to the
/// dispatcher.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &ScheduledJob);
}

/// Money ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Debit `amount` from `owner_id`
    ///
    /// `Ok(false)` means the ledger refused the debit (insufficient funds or
    /// another recoverable business failure). `Err` means the ledger itself
    /// could not be reached.
    async fn charge(&self, owner_id: Uuid, amount: Decimal, memo: &str) -> Result<bool, AppError>;
}

/// Notification delivery
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Send an in-world instant message
    async fn send_instant_message(&self, recipient: Uuid, text: &str) -> Result<(), AppError>;

    /// Send an email
    async fn send_email(&self, recipient: Uuid, subject: &str, body: &str)
        -> Result<(), AppError>;
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_meta() {
        assert_eq!(PaginationMeta::new(95, 1, 10).total_pages, 10);
        assert_eq!(PaginationMeta::new(101, 1, 10).total_pages, 11);
        assert_eq!(PaginationMeta::new(0, 1, 10).total_pages, 0);
    }
}
