//! In-memory collaborators for collector scenarios

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use classbill_core::{
    models::{
        BillingJobState, Classified, ClassifiedCategory, ClassifiedFlags, ListingSummary,
        NotificationChannel, NotificationKind, ScheduledJob, TemplateSet,
    },
    traits::{JobRepository, Ledger, ListingRepository, NotificationSink},
    AppError, AppResult,
};
use classbill_services::{
    ClassifiedBillingHandler, DiscoverySweep, EscalationPolicy, JobDispatcher, NotificationResolver,
    Notifier, BILLING_JOB_KIND,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Directory store keyed by listing id, enumerated in insertion order
#[derive(Default)]
pub struct MemoryDirectory {
    listings: Mutex<Vec<Classified>>,
}

impl MemoryDirectory {
    pub fn add(&self, listing: Classified) {
        self.listings.lock().push(listing);
    }

    pub fn get(&self, id: Uuid) -> Option<Classified> {
        self.listings.lock().iter().find(|l| l.id == id).cloned()
    }
}

#[async_trait]
impl ListingRepository for MemoryDirectory {
    async fn find_enabled(
        &self,
        _category: ClassifiedCategory,
        flags: ClassifiedFlags,
        offset: i64,
    ) -> AppResult<Vec<ListingSummary>> {
        Ok(self
            .listings
            .lock()
            .iter()
            .filter(|l| l.flags.contains(flags))
            .skip(offset as usize)
            .take(classbill_core::traits::LISTING_PAGE_SIZE as usize)
            .map(Classified::summary)
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Classified>> {
        Ok(self.get(id))
    }

    async fn persist(&self, listing: &Classified) -> AppResult<()> {
        let mut listings = self.listings.lock();
        let stored = listings
            .iter_mut()
            .find(|l| l.id == listing.id)
            .ok_or_else(|| AppError::NotFound(format!("Classified {}", listing.id)))?;
        stored.flags = listing.flags;
        Ok(())
    }
}

/// Job store that advances claimed jobs like the database does
#[derive(Default)]
pub struct MemoryScheduler {
    jobs: Mutex<HashMap<String, ScheduledJob>>,
}

impl MemoryScheduler {
    pub fn get(&self, id: &str) -> Option<ScheduledJob> {
        self.jobs.lock().get(id).cloned()
    }

    pub fn insert(&self, job: ScheduledJob) {
        self.jobs.lock().insert(job.id.clone(), job);
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn failure_count(&self, listing_id: Uuid) -> Option<u32> {
        let key = BillingJobState::new(listing_id).job_key();
        self.get(&key)
            .map(|job| BillingJobState::from_payload(&job.payload).map(|s| s.failure_count))
            .transpose()
            .ok()
            .flatten()
    }

    /// Next time the listing's job fires
    pub fn next_fire(&self, listing_id: Uuid) -> Option<DateTime<Utc>> {
        self.get(&BillingJobState::new(listing_id).job_key())
            .map(|job| job.next_fire_at)
    }
}

#[async_trait]
impl JobRepository for MemoryScheduler {
    async fn exists(&self, job_id: &str) -> AppResult<bool> {
        Ok(self.jobs.lock().contains_key(job_id))
    }

    async fn find_by_id(&self, job_id: &str) -> AppResult<Option<ScheduledJob>> {
        Ok(self.get(job_id))
    }

    async fn save(&self, job: &ScheduledJob) -> AppResult<()> {
        self.insert(job.clone());
        Ok(())
    }

    async fn remove(&self, job_id: &str) -> AppResult<bool> {
        Ok(self.jobs.lock().remove(job_id).is_some())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        kinds: &[String],
        limit: i64,
    ) -> AppResult<Vec<ScheduledJob>> {
        let mut jobs = self.jobs.lock();
        let mut due: Vec<String> = jobs
            .values()
            .filter(|job| job.is_due(now) && kinds.contains(&job.kind))
            .map(|job| job.id.clone())
            .collect();
        due.sort();
        due.truncate(limit as usize);

        let mut claimed = Vec::new();
        for id in due {
            let Some(mut job) = jobs.remove(&id) else {
                continue;
            };
            if job.advance(now) {
                jobs.insert(id, job.clone());
            }
            claimed.push(job);
        }
        Ok(claimed)
    }

    async fn list(
        &self,
        kind: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<ScheduledJob>, i64)> {
        let jobs = self.jobs.lock();
        let mut matching: Vec<ScheduledJob> = jobs
            .values()
            .filter(|job| kind.map_or(true, |k| job.kind == k))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        let total = matching.len() as i64;
        Ok((
            matching
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            total,
        ))
    }
}

/// Ledger backed by per-owner balances
#[derive(Default)]
pub struct MemoryLedger {
    balances: Mutex<HashMap<Uuid, Decimal>>,
    memos: Mutex<Vec<String>>,
}

impl MemoryLedger {
    pub fn deposit(&self, owner: Uuid, amount: Decimal) {
        *self.balances.lock().entry(owner).or_default() += amount;
    }

    pub fn balance(&self, owner: Uuid) -> Decimal {
        self.balances.lock().get(&owner).copied().unwrap_or_default()
    }

    pub fn memos(&self) -> Vec<String> {
        self.memos.lock().clone()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn charge(&self, owner_id: Uuid, amount: Decimal, memo: &str) -> AppResult<bool> {
        let mut balances = self.balances.lock();
        let balance = balances.entry(owner_id).or_default();
        if *balance < amount {
            return Ok(false);
        }
        *balance -= amount;
        self.memos.lock().push(memo.to_string());
        Ok(true)
    }
}

/// Notification sink that keeps everything it is given
#[derive(Default)]
pub struct Outbox {
    messages: Mutex<Vec<(Uuid, String)>>,
}

impl Outbox {
    pub fn messages(&self) -> Vec<(Uuid, String)> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for Outbox {
    async fn send_instant_message(&self, recipient: Uuid, text: &str) -> AppResult<()> {
        self.messages.lock().push((recipient, text.to_string()));
        Ok(())
    }

    async fn send_email(&self, recipient: Uuid, _subject: &str, body: &str) -> AppResult<()> {
        self.messages.lock().push((recipient, body.to_string()));
        Ok(())
    }
}

/// Everything a scenario needs, wired the way the service wires it
pub struct World {
    pub directory: Arc<MemoryDirectory>,
    pub scheduler: Arc<MemoryScheduler>,
    pub ledger: Arc<MemoryLedger>,
    pub outbox: Arc<Outbox>,
    pub sweep: DiscoverySweep,
    pub dispatcher: JobDispatcher,
}

impl World {
    pub fn new(max_retries: u32) -> Self {
        let directory = Arc::new(MemoryDirectory::default());
        let scheduler = Arc::new(MemoryScheduler::default());
        let ledger = Arc::new(MemoryLedger::default());
        let outbox = Arc::new(Outbox::default());

        let listings: Arc<dyn ListingRepository> = directory.clone();
        let jobs: Arc<dyn JobRepository> = scheduler.clone();
        let period = classbill_core::models::RepeatInterval::Months(1);

        let notifier = Notifier::new(
            NotificationResolver::new(NotificationChannel::InteractiveMessage(TemplateSet {
                success: Some("renewed {listing}".to_string()),
                failure: Some("payment {failures}/{max_retries} failed for {listing}".to_string()),
                removal: Some("{listing} removed".to_string()),
            })),
            outbox.clone(),
            [
                NotificationKind::Success,
                NotificationKind::Failure,
                NotificationKind::Removal,
            ],
        );

        let handler = Arc::new(ClassifiedBillingHandler::new(
            Some(listings.clone()),
            jobs.clone(),
            Some(ledger.clone() as Arc<dyn Ledger>),
            EscalationPolicy::new(max_retries),
            notifier,
        ));

        let dispatcher = JobDispatcher::new(jobs.clone(), 100);
        dispatcher.register(BILLING_JOB_KIND, handler);

        Self {
            sweep: DiscoverySweep::new(Some(listings), jobs, period),
            directory,
            scheduler,
            ledger,
            outbox,
            dispatcher,
        }
    }

    /// Add an enabled listing created `age_days` ago
    pub fn list(&self, name: &str, fee: Decimal, age_days: i64) -> Classified {
        let listing = Classified {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: name.to_string(),
            price_per_period: fee,
            flags: ClassifiedFlags::ENABLED | ClassifiedFlags::AUTO_RENEW,
            category: ClassifiedCategory::Shopping,
            created_at: Utc::now() - Duration::days(age_days),
        };
        self.directory.add(listing.clone());
        listing
    }

    /// Fire the listing's job at its scheduled time
    pub async fn fire(&self, listing_id: Uuid) -> usize {
        let now = self
            .scheduler
            .next_fire(listing_id)
            .expect("listing has no billing job");
        self.dispatcher.run_due(now).await.expect("dispatch failed")
    }
}
