//! Discovery sweep
//!
//! Walks every enabled listing in the directory and makes sure each has a
//! billing job. Jobs that already exist are left untouched, so running the
//! sweep any number of times converges on exactly one job per listing.

use chrono::{DateTime, Utc};
use classbill_core::{
    models::{
        BillingJobState, ClassifiedCategory, ClassifiedFlags, ListingSummary, RepeatInterval,
        ScheduledJob, BILLING_JOB_KIND,
    },
    traits::{JobRepository, ListingRepository},
    AppError, AppResult,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Counters for one completed sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub pages: u32,
    pub listings_seen: u64,
    pub jobs_created: u64,
    pub already_supervised: u64,
    pub errors: u64,
}

/// Result of asking for a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep was still walking the directory
    AlreadyRunning,
    /// The directory store is not available
    Skipped,
}

/// Clears the in-progress flag when the sweep ends, including on early return
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic discovery of listings that need billing
pub struct DiscoverySweep {
    listings: Option<Arc<dyn ListingRepository>>,
    jobs: Arc<dyn JobRepository>,
    period: RepeatInterval,
    in_progress: AtomicBool,
}

impl DiscoverySweep {
    /// Create a new sweep
    ///
    /// `listings` is `None` when the directory store could not be resolved;
    /// every sweep is then skipped.
    pub fn new(
        listings: Option<Arc<dyn ListingRepository>>,
        jobs: Arc<dyn JobRepository>,
        period: RepeatInterval,
    ) -> Self {
        Self {
            listings,
            jobs,
            period,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// First billing time for a listing: the first period anniversary of its
    /// creation that is still ahead of `now`
    pub fn first_fire_at(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.period.first_after(created_at, now)
    }

    /// Run one sweep unless another is already in progress
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> SweepOutcome {
        let Some(listings) = self.listings.as_ref() else {
            warn!("Listing store unavailable, skipping discovery sweep");
            return SweepOutcome::Skipped;
        };

        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Discovery sweep already running");
            return SweepOutcome::AlreadyRunning;
        }
        let _guard = SweepGuard(&self.in_progress);

        let report = self.sweep(listings.as_ref()).await;
        info!(
            "Discovery sweep done: {} listings over {} pages, {} jobs created, {} errors",
            report.listings_seen, report.pages, report.jobs_created, report.errors
        );

        SweepOutcome::Completed(report)
    }

    async fn sweep(&self, listings: &dyn ListingRepository) -> SweepReport {
        let mut report = SweepReport::default();
        let mut offset = 0i64;

        loop {
            let page = match listings
                .find_enabled(ClassifiedCategory::Any, ClassifiedFlags::ENABLED, offset)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    error!("Failed to read listings at offset {}: {}", offset, e);
                    report.errors += 1;
                    break;
                }
            };

            if page.is_empty() {
                break;
            }

            report.pages += 1;
            offset += page.len() as i64;

            for listing in &page {
                report.listings_seen += 1;
                match self.ensure_job(listing).await {
                    Ok(true) => report.jobs_created += 1,
                    Ok(false) => report.already_supervised += 1,
                    Err(e) => {
                        warn!("Could not schedule billing for {}: {}", listing.id, e);
                        report.errors += 1;
                    }
                }
            }
        }

        report
    }

    /// Create the billing job for `listing` if none exists
    ///
    /// Returns whether a job was created.
    #[instrument(skip(self, listing), fields(listing_id = %listing.id))]
    pub async fn ensure_job(&self, listing: &ListingSummary) -> AppResult<bool> {
        let state = BillingJobState::new(listing.id);
        let key = state.job_key();

        if self.jobs.exists(&key).await? {
            return Ok(false);
        }

        let now = Utc::now();
        let first_fire = self.first_fire_at(listing.created_at, now).ok_or_else(|| {
            AppError::Internal(format!("Billing period {} produces no fire time", self.period))
        })?;

        let job = ScheduledJob::recurring(
            key,
            BILLING_JOB_KIND,
            state.to_payload()?,
            first_fire,
            self.period,
        );
        self.jobs.save(&job).await?;

        debug!("Scheduled billing, first charge at {}", first_fire);
        Ok(true)
    }

    /// Sweep every `interval` until `shutdown` turns true
    ///
    /// The first sweep runs immediately.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Discovery sweep started, every {}s", interval.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Discovery sweep stopped");
    }
}
