//! Job dispatcher
//!
//! Polls the job store for due jobs and hands each one to the handler
//! registered for its kind. Every handler call runs in its own task, so a
//! panicking handler loses only its own job.

use chrono::{DateTime, Utc};
use classbill_core::{
    traits::{JobHandler, JobRepository},
    AppResult,
};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Routes due jobs to handlers by kind
pub struct JobDispatcher {
    jobs: Arc<dyn JobRepository>,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    batch_size: i64,
}

impl JobDispatcher {
    pub fn new(jobs: Arc<dyn JobRepository>, batch_size: i64) -> Self {
        Self {
            jobs,
            handlers: RwLock::new(HashMap::new()),
            batch_size: batch_size.max(1),
        }
    }

    /// Register the handler for jobs of `kind`, replacing any earlier one
    pub fn register(&self, kind: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let kind = kind.into();
        if self.handlers.write().insert(kind.clone(), handler).is_some() {
            warn!("Replaced handler for job kind {}", kind);
        } else {
            info!("Registered handler for job kind {}", kind);
        }
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.handlers.read().contains_key(kind)
    }

    /// Claim and run every job due at `now`
    ///
    /// Returns how many jobs were handed to a handler.
    #[instrument(skip(self))]
    pub async fn run_due(&self, now: DateTime<Utc>) -> AppResult<usize> {
        // Only claim kinds someone can handle; claiming advances the job
        let kinds: Vec<String> = self.handlers.read().keys().cloned().collect();
        if kinds.is_empty() {
            return Ok(0);
        }

        let due = self.jobs.claim_due(now, &kinds, self.batch_size).await?;
        if due.is_empty() {
            return Ok(0);
        }

        let mut tasks = Vec::with_capacity(due.len());
        for job in due {
            let handler = self.handlers.read().get(&job.kind).cloned();
            let Some(handler) = handler else {
                warn!("No handler for job {} of kind {}", job.id, job.kind);
                continue;
            };

            let job_id = job.id.clone();
            let task = tokio::spawn(async move {
                handler.handle(&job).await;
            });
            tasks.push((job_id, task));
        }

        let dispatched = tasks.len();
        let (ids, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();

        for (job_id, result) in ids.into_iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                error!("Handler for job {} aborted: {}", job_id, e);
            }
        }

        debug!("Dispatched {} due jobs", dispatched);
        Ok(dispatched)
    }

    /// Poll every `interval` until `shutdown` turns true
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Job dispatcher started, polling every {}s", interval.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_due(Utc::now()).await {
                        error!("Failed to poll due jobs: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Job dispatcher stopped");
    }
}
