//! Collector wiring
//!
//! Builds the discovery sweep and the billing handler from configuration
//! and the available collaborators. A disabled or unusable configuration
//! yields no collector at all; the rest of the service keeps running.

use crate::billing::ClassifiedBillingHandler;
use crate::discovery::DiscoverySweep;
use crate::dispatcher::JobDispatcher;
use crate::escalation::EscalationPolicy;
use crate::notifications::{NotificationResolver, Notifier};
use classbill_core::{
    config::BillingConfig,
    models::{NotificationKind, BILLING_JOB_KIND},
    traits::{JobRepository, Ledger, ListingRepository, NotificationSink},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// External services the collector talks to
///
/// Listing store and ledger are optional: when either cannot be resolved
/// the collector still starts and skips the work that needs it.
#[derive(Clone)]
pub struct Collaborators {
    pub listings: Option<Arc<dyn ListingRepository>>,
    pub jobs: Arc<dyn JobRepository>,
    pub ledger: Option<Arc<dyn Ledger>>,
    pub notifications: Arc<dyn NotificationSink>,
}

/// Classified billing collector
pub struct Collector {
    sweep: Arc<DiscoverySweep>,
    handler: Arc<ClassifiedBillingHandler>,
    sweep_interval: Duration,
}

impl Collector {
    /// Build the collector, or `None` when billing is disabled or the
    /// configuration is invalid
    pub fn from_config(config: &BillingConfig, deps: Collaborators) -> Option<Self> {
        if !config.enabled {
            info!("Classified billing disabled");
            return None;
        }

        if let Err(e) = config.validate() {
            warn!("Classified billing disabled: {}", e);
            return None;
        }

        let period = config.billing_period();
        let policy = EscalationPolicy::from_config(config);

        let enabled_kinds = [
            NotificationKind::Success,
            NotificationKind::Failure,
            NotificationKind::Removal,
        ]
        .into_iter()
        .filter(|kind| config.notifies(*kind));
        let notifier = Notifier::new(
            NotificationResolver::new(config.notification_channel()),
            deps.notifications,
            enabled_kinds,
        );

        if deps.listings.is_none() {
            warn!("Listing store unavailable; sweeps and charges will be skipped");
        }
        if deps.ledger.is_none() {
            warn!("Ledger unavailable; charges will be skipped");
        }

        let sweep = Arc::new(DiscoverySweep::new(
            deps.listings.clone(),
            deps.jobs.clone(),
            period,
        ));
        let handler = Arc::new(ClassifiedBillingHandler::new(
            deps.listings,
            deps.jobs,
            deps.ledger,
            policy,
            notifier,
        ));

        info!(
            "Classified billing enabled: period {}, max {} retries, {} notifications",
            period,
            policy.max_retries,
            config.notification_channel().name()
        );

        Some(Self {
            sweep,
            handler,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        })
    }

    pub fn sweep(&self) -> Arc<DiscoverySweep> {
        self.sweep.clone()
    }

    pub fn handler(&self) -> Arc<ClassifiedBillingHandler> {
        self.handler.clone()
    }

    /// Register the billing handler and start the periodic sweep
    pub fn start(&self, dispatcher: &JobDispatcher, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        dispatcher.register(BILLING_JOB_KIND, self.handler.clone());
        tokio::spawn(self.sweep.clone().run(self.sweep_interval, shutdown))
    }
}
