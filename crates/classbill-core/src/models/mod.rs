//! Domain models for the billing collector
//!
//! This module contains the listing entities read from the directory, the
//! scheduler job record, and the billing state carried inside it.

pub mod billing_job;
pub mod classified;
pub mod notification;
pub mod scheduled_job;

pub use billing_job::{BillingJobState, BILLING_JOB_KIND};
pub use classified::{Classified, ClassifiedCategory, ClassifiedFlags, ListingSummary};
pub use notification::{NotificationChannel, NotificationKind, TemplateSet};
pub use scheduled_job::{RepeatInterval, ScheduledJob};
