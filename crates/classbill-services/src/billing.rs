//! Classified billing job handler
//!
//! Runs each time a listing's billing job fires: charges one period's fee,
//! and on refusal counts the failure against the escalation policy. Once
//! retries are exhausted the listing is disabled and its job removed.
//!
//! The failure count lives in the job payload, so the count and the job's
//! existence change together in a single save or remove.

use crate::escalation::{decide, BillingDecision, EscalationPolicy};
use crate::notifications::{NotificationContext, Notifier};
use async_trait::async_trait;
use chrono::Utc;
use classbill_core::{
    models::{BillingJobState, Classified, NotificationKind, ScheduledJob},
    traits::{JobHandler, JobRepository, Ledger, ListingRepository},
    AppResult,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// What one firing of a billing job did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingOutcome {
    /// Payload could not be decoded; the job was left alone
    InvalidPayload,
    /// Directory store unavailable; nothing was charged
    ListingStoreUnavailable,
    /// Listing no longer exists; job removed
    ListingMissing,
    /// Listing was taken down elsewhere; job removed without charging
    ListingDisabled,
    /// Ledger unavailable; nothing was charged or counted
    LedgerUnavailable,
    /// Period fee charged
    Charged,
    /// Charge refused; failure recorded
    RetryScheduled { failures: u32 },
    /// Retries exhausted; listing disabled and job removed
    Removed { failures: u32 },
}

/// Handler for `CLASSBILL` jobs
pub struct ClassifiedBillingHandler {
    listings: Option<Arc<dyn ListingRepository>>,
    jobs: Arc<dyn JobRepository>,
    ledger: Option<Arc<dyn Ledger>>,
    policy: EscalationPolicy,
    notifier: Notifier,
}

impl ClassifiedBillingHandler {
    pub fn new(
        listings: Option<Arc<dyn ListingRepository>>,
        jobs: Arc<dyn JobRepository>,
        ledger: Option<Arc<dyn Ledger>>,
        policy: EscalationPolicy,
        notifier: Notifier,
    ) -> Self {
        Self {
            listings,
            jobs,
            ledger,
            policy,
            notifier,
        }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Process one firing of `job`
    ///
    /// `job` is the record as claimed from the scheduler, already advanced
    /// to its next fire time.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn process(&self, job: &ScheduledJob) -> BillingOutcome {
        let state = match BillingJobState::from_payload(&job.payload) {
            Ok(state) => state,
            Err(e) => {
                error!("Ignoring billing job with bad payload: {}", e);
                return BillingOutcome::InvalidPayload;
            }
        };

        let Some(listings) = self.listings.as_ref() else {
            warn!("Listing store unavailable, cannot bill {}", state.listing_id);
            return BillingOutcome::ListingStoreUnavailable;
        };

        let listing = match listings.find_by_id(state.listing_id).await {
            Ok(Some(listing)) => listing,
            Ok(None) => {
                info!("Listing {} no longer exists, dropping its billing job", state.listing_id);
                self.remove_job(&job.id).await;
                return BillingOutcome::ListingMissing;
            }
            Err(e) => {
                error!("Failed to load listing {}: {}", state.listing_id, e);
                return BillingOutcome::ListingStoreUnavailable;
            }
        };

        if !listing.is_enabled() {
            info!("Listing {} is disabled, dropping its billing job", listing.id);
            self.remove_job(&job.id).await;
            return BillingOutcome::ListingDisabled;
        }

        let Some(ledger) = self.ledger.as_ref() else {
            warn!("Ledger unavailable, skipping charge for {}", listing.id);
            return BillingOutcome::LedgerUnavailable;
        };

        let charged = match ledger
            .charge(listing.owner_id, listing.price_per_period, &listing.charge_memo())
            .await
        {
            Ok(charged) => charged,
            Err(e) if e.is_infrastructure() => {
                error!("Ledger error charging {}: {}", listing.id, e);
                return BillingOutcome::LedgerUnavailable;
            }
            Err(e) => {
                warn!("Charge for {} rejected: {}", listing.id, e);
                false
            }
        };

        match decide(state, charged, &self.policy) {
            BillingDecision::Paid { reset } => {
                if let Some(reset) = reset {
                    if let Err(e) = self.store_state(job, reset, false).await {
                        error!("Failed to reset failure count for {}: {}", listing.id, e);
                    }
                }
                info!("Charged {} for listing {}", listing.price_per_period, listing.id);
                self.notify(NotificationKind::Success, &listing, 0).await;
                BillingOutcome::Charged
            }
            BillingDecision::Retry { next } => {
                if let Err(e) = self.store_state(job, next, true).await {
                    error!("Failed to record failure for {}: {}", listing.id, e);
                }
                warn!(
                    "Charge for listing {} failed ({} of {})",
                    listing.id, next.failure_count, self.policy.max_retries
                );
                self.notify(NotificationKind::Failure, &listing, next.failure_count)
                    .await;
                BillingOutcome::RetryScheduled {
                    failures: next.failure_count,
                }
            }
            BillingDecision::Escalate { failures } => {
                self.escalate(job, listing, failures).await
            }
        }
    }

    async fn escalate(&self, job: &ScheduledJob, mut listing: Classified, failures: u32) -> BillingOutcome {
        warn!(
            "Listing {} failed {} charges, taking it down",
            listing.id, failures
        );

        listing.disable();
        if let Some(listings) = self.listings.as_ref() {
            if let Err(e) = listings.persist(&listing).await {
                // Job keeps its old count, so the next fire escalates again
                error!("Failed to disable listing {}: {}", listing.id, e);
                return BillingOutcome::ListingStoreUnavailable;
            }
        }

        self.remove_job(&job.id).await;
        self.notify(NotificationKind::Removal, &listing, failures).await;

        BillingOutcome::Removed { failures }
    }

    /// Rewrite the job's payload with `state`
    async fn store_state(
        &self,
        job: &ScheduledJob,
        state: BillingJobState,
        failed: bool,
    ) -> AppResult<()> {
        let mut updated = job.clone();
        updated.payload = state.to_payload()?;

        if failed {
            if let Some(delay) = self.policy.retry_delay {
                updated.next_fire_at = Utc::now() + delay;
            }
        }

        self.jobs.save(&updated).await
    }

    async fn remove_job(&self, job_id: &str) {
        match self.jobs.remove(job_id).await {
            Ok(true) => debug!("Removed billing job {}", job_id),
            Ok(false) => debug!("Billing job {} was already gone", job_id),
            Err(e) => error!("Failed to remove billing job {}: {}", job_id, e),
        }
    }

    async fn notify(&self, kind: NotificationKind, listing: &Classified, failures: u32) {
        let ctx = NotificationContext::for_listing(listing, failures, self.policy.max_retries);
        self.notifier.notify(kind, listing, &ctx).await;
    }
}

#[async_trait]
impl JobHandler for ClassifiedBillingHandler {
    async fn handle(&self, job: &ScheduledJob) {
        let outcome = self.process(job).await;
        debug!("Billing job {} finished: {:?}", job.id, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationResolver;
    use chrono::{DateTime, Duration};
    use classbill_core::models::{
        ClassifiedCategory, ClassifiedFlags, ListingSummary, NotificationChannel, RepeatInterval,
        TemplateSet, BILLING_JOB_KIND,
    };
    use classbill_core::traits::NotificationSink;
    use classbill_core::AppError;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use uuid::Uuid;

    #[derive(Default)]
    struct Listings {
        by_id: Mutex<HashMap<Uuid, Classified>>,
    }

    #[async_trait]
    impl ListingRepository for Listings {
        async fn find_enabled(
            &self,
            _category: ClassifiedCategory,
            _flags: ClassifiedFlags,
            _offset: i64,
        ) -> AppResult<Vec<ListingSummary>> {
            Ok(Vec::new())
        }

        async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Classified>> {
            Ok(self.by_id.lock().get(&id).cloned())
        }

        async fn persist(&self, listing: &Classified) -> AppResult<()> {
            self.by_id.lock().insert(listing.id, listing.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Jobs {
        by_id: Mutex<HashMap<String, ScheduledJob>>,
    }

    #[async_trait]
    impl JobRepository for Jobs {
        async fn exists(&self, job_id: &str) -> AppResult<bool> {
            Ok(self.by_id.lock().contains_key(job_id))
        }

        async fn find_by_id(&self, job_id: &str) -> AppResult<Option<ScheduledJob>> {
            Ok(self.by_id.lock().get(job_id).cloned())
        }

        async fn save(&self, job: &ScheduledJob) -> AppResult<()> {
            self.by_id.lock().insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn remove(&self, job_id: &str) -> AppResult<bool> {
            Ok(self.by_id.lock().remove(job_id).is_some())
        }

        async fn claim_due(
            &self,
            _now: DateTime<Utc>,
            _kinds: &[String],
            _limit: i64,
        ) -> AppResult<Vec<ScheduledJob>> {
            Ok(Vec::new())
        }

        async fn list(
            &self,
            _kind: Option<&str>,
            _limit: i64,
            _offset: i64,
        ) -> AppResult<(Vec<ScheduledJob>, i64)> {
            Ok((Vec::new(), 0))
        }
    }

    /// Ledger that approves while the balance covers the charge
    struct Wallet {
        balance: Mutex<Decimal>,
        charges: Mutex<u32>,
        offline: bool,
    }

    impl Wallet {
        fn with_balance(balance: Decimal) -> Self {
            Self {
                balance: Mutex::new(balance),
                charges: Mutex::new(0),
                offline: false,
            }
        }
    }

    #[async_trait]
    impl Ledger for Wallet {
        async fn charge(&self, _owner: Uuid, amount: Decimal, _memo: &str) -> AppResult<bool> {
            if self.offline {
                return Err(AppError::CollaboratorUnavailable("ledger".to_string()));
            }
            *self.charges.lock() += 1;
            let mut balance = self.balance.lock();
            if *balance < amount {
                return Ok(false);
            }
            *balance -= amount;
            Ok(true)
        }
    }

    #[derive(Default)]
    struct Inbox {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSink for Inbox {
        async fn send_instant_message(&self, _recipient: Uuid, text: &str) -> AppResult<()> {
            self.messages.lock().push(text.to_string());
            Ok(())
        }

        async fn send_email(&self, _recipient: Uuid, _subject: &str, body: &str) -> AppResult<()> {
            self.messages.lock().push(body.to_string());
            Ok(())
        }
    }

    struct Fixture {
        listings: Arc<Listings>,
        jobs: Arc<Jobs>,
        wallet: Arc<Wallet>,
        inbox: Arc<Inbox>,
        listing: Classified,
        job: ScheduledJob,
    }

    impl Fixture {
        fn new(balance: Decimal, failure_count: u32) -> Self {
            let listing = Classified {
                id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                name: "Sky Lounge".to_string(),
                price_per_period: dec!(25),
                flags: ClassifiedFlags::ENABLED,
                category: ClassifiedCategory::SpecialAttraction,
                created_at: Utc::now() - Duration::days(40),
            };
            let state = BillingJobState {
                listing_id: listing.id,
                failure_count,
            };
            let job = ScheduledJob::recurring(
                state.job_key(),
                BILLING_JOB_KIND,
                state.to_payload().unwrap(),
                Utc::now() + Duration::days(30),
                RepeatInterval::Months(1),
            );

            let listings = Arc::new(Listings::default());
            listings.by_id.lock().insert(listing.id, listing.clone());
            let jobs = Arc::new(Jobs::default());
            jobs.by_id.lock().insert(job.id.clone(), job.clone());

            Self {
                listings,
                jobs,
                wallet: Arc::new(Wallet::with_balance(balance)),
                inbox: Arc::new(Inbox::default()),
                listing,
                job,
            }
        }

        fn handler(&self, policy: EscalationPolicy) -> ClassifiedBillingHandler {
            let notifier = Notifier::new(
                NotificationResolver::new(NotificationChannel::InteractiveMessage(TemplateSet {
                    success: Some("paid {listing}".to_string()),
                    failure: Some("failed {failures}/{max_retries}".to_string()),
                    removal: Some("removed {listing}".to_string()),
                })),
                self.inbox.clone(),
                [
                    NotificationKind::Success,
                    NotificationKind::Failure,
                    NotificationKind::Removal,
                ],
            );
            ClassifiedBillingHandler::new(
                Some(self.listings.clone() as Arc<dyn ListingRepository>),
                self.jobs.clone(),
                Some(self.wallet.clone() as Arc<dyn Ledger>),
                policy,
                notifier,
            )
        }

        fn stored_count(&self) -> Option<u32> {
            self.jobs
                .by_id
                .lock()
                .get(&self.job.id)
                .map(|job| BillingJobState::from_payload(&job.payload).unwrap().failure_count)
        }
    }

    #[tokio::test]
    async fn test_successful_charge() {
        let fx = Fixture::new(dec!(100), 0);
        let outcome = fx.handler(EscalationPolicy::new(3)).process(&fx.job).await;

        assert_eq!(outcome, BillingOutcome::Charged);
        assert_eq!(*fx.wallet.balance.lock(), dec!(75));
        assert_eq!(fx.stored_count(), Some(0));
        assert_eq!(*fx.inbox.messages.lock(), vec!["paid Sky Lounge".to_string()]);
    }

    #[tokio::test]
    async fn test_success_resets_previous_failures() {
        let fx = Fixture::new(dec!(100), 2);
        let outcome = fx.handler(EscalationPolicy::new(3)).process(&fx.job).await;

        assert_eq!(outcome, BillingOutcome::Charged);
        assert_eq!(fx.stored_count(), Some(0));
    }

    #[tokio::test]
    async fn test_failure_increments_count() {
        let fx = Fixture::new(dec!(0), 1);
        let outcome = fx.handler(EscalationPolicy::new(3)).process(&fx.job).await;

        assert_eq!(outcome, BillingOutcome::RetryScheduled { failures: 2 });
        assert_eq!(fx.stored_count(), Some(2));
        assert!(fx.listings.by_id.lock()[&fx.listing.id].is_enabled());
        assert_eq!(*fx.inbox.messages.lock(), vec!["failed 2/3".to_string()]);
    }

    #[tokio::test]
    async fn test_retry_delay_pulls_next_fire_forward() {
        let fx = Fixture::new(dec!(0), 0);
        let policy = EscalationPolicy::new(3).with_retry_delay(Duration::hours(1));
        fx.handler(policy).process(&fx.job).await;

        let stored = fx.jobs.by_id.lock()[&fx.job.id].clone();
        assert!(stored.next_fire_at < fx.job.next_fire_at);
        assert!(stored.next_fire_at <= Utc::now() + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_exhausted_retries_remove_listing() {
        let fx = Fixture::new(dec!(0), 3);
        let outcome = fx.handler(EscalationPolicy::new(3)).process(&fx.job).await;

        assert_eq!(outcome, BillingOutcome::Removed { failures: 4 });
        assert_eq!(fx.stored_count(), None);
        assert!(!fx.listings.by_id.lock()[&fx.listing.id].is_enabled());
        assert_eq!(*fx.inbox.messages.lock(), vec!["removed Sky Lounge".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_listing_drops_job() {
        let fx = Fixture::new(dec!(100), 0);
        fx.listings.by_id.lock().clear();

        let outcome = fx.handler(EscalationPolicy::new(3)).process(&fx.job).await;
        assert_eq!(outcome, BillingOutcome::ListingMissing);
        assert_eq!(fx.stored_count(), None);
        assert_eq!(*fx.wallet.charges.lock(), 0);
    }

    #[tokio::test]
    async fn test_disabled_listing_is_not_charged() {
        let fx = Fixture::new(dec!(100), 0);
        fx.listings
            .by_id
            .lock()
            .get_mut(&fx.listing.id)
            .unwrap()
            .disable();

        let outcome = fx.handler(EscalationPolicy::new(3)).process(&fx.job).await;
        assert_eq!(outcome, BillingOutcome::ListingDisabled);
        assert_eq!(fx.stored_count(), None);
        assert_eq!(*fx.wallet.balance.lock(), dec!(100));
    }

    #[tokio::test]
    async fn test_bad_payload_leaves_job_alone() {
        let fx = Fixture::new(dec!(100), 0);
        let mut job = fx.job.clone();
        job.payload = serde_json::json!({ "CLASSBILL": "not-a-uuid" });

        let outcome = fx.handler(EscalationPolicy::new(3)).process(&job).await;
        assert_eq!(outcome, BillingOutcome::InvalidPayload);
        assert_eq!(fx.stored_count(), Some(0));
        assert_eq!(*fx.wallet.charges.lock(), 0);
    }

    #[tokio::test]
    async fn test_ledger_outage_changes_nothing() {
        let mut fx = Fixture::new(dec!(100), 1);
        fx.wallet = Arc::new(Wallet {
            offline: true,
            ..Wallet::with_balance(dec!(100))
        });

        let outcome = fx.handler(EscalationPolicy::new(3)).process(&fx.job).await;
        assert_eq!(outcome, BillingOutcome::LedgerUnavailable);
        assert_eq!(fx.stored_count(), Some(1));
        assert!(fx.inbox.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_ledger_skips_charge() {
        let fx = Fixture::new(dec!(100), 0);
        let handler = ClassifiedBillingHandler::new(
            Some(fx.listings.clone() as Arc<dyn ListingRepository>),
            fx.jobs.clone(),
            None,
            EscalationPolicy::new(3),
            fx.handler(EscalationPolicy::new(3)).notifier.clone(),
        );

        assert_eq!(handler.process(&fx.job).await, BillingOutcome::LedgerUnavailable);
        assert_eq!(fx.stored_count(), Some(0));
    }
}
