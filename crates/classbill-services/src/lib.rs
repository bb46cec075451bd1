//! Billing services for classified listings
//!
//! This crate holds the policy side of classified billing. Storage, ledger
//! and notification delivery are reached only through the collaborator
//! traits in `classbill_core::traits`.
//!
//! # Services
//!
//! - `DiscoverySweep` - Finds enabled listings and schedules their billing jobs
//! - `ClassifiedBillingHandler` - Charges one listing when its job fires
//! - `EscalationPolicy` - Retry and removal decision after a charge attempt
//! - `NotificationResolver` / `Notifier` - Owner notification text and delivery
//! - `JobDispatcher` - Polls due jobs and routes them to registered handlers
//! - `Collector` - Wires the above together from configuration

pub mod billing;
pub mod collector;
pub mod discovery;
pub mod dispatcher;
pub mod escalation;
pub mod notifications;

pub use billing::{BillingOutcome, ClassifiedBillingHandler};
pub use collector::{Collaborators, Collector};
pub use discovery::{DiscoverySweep, SweepOutcome, SweepReport};
pub use dispatcher::JobDispatcher;
pub use escalation::{decide, BillingDecision, EscalationPolicy};
pub use notifications::{render_template, NotificationContext, NotificationResolver, Notifier};

pub use classbill_core::models::BILLING_JOB_KIND;
