//! Notification models
//!
//! Owners hear about billing outcomes either as an in-world instant message
//! or as a templated email whose body lives in a file on disk.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Billing event that may be reported to the listing owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The period fee was charged
    Success,
    /// The charge failed and will be retried
    Failure,
    /// Retries are exhausted and the listing was taken down
    Removal,
}

impl NotificationKind {
    /// Email subject line for this event
    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::Success => "Classified listing renewed",
            NotificationKind::Failure => "Classified listing payment failed",
            NotificationKind::Removal => "Classified listing removed",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Success => write!(f, "success"),
            NotificationKind::Failure => write!(f, "failure"),
            NotificationKind::Removal => write!(f, "removal"),
        }
    }
}

/// One template slot per notification kind
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemplateSet<T> {
    pub success: Option<T>,
    pub failure: Option<T>,
    pub removal: Option<T>,
}

impl<T> TemplateSet<T> {
    /// Template configured for `kind`, if any
    pub fn get(&self, kind: NotificationKind) -> Option<&T> {
        match kind {
            NotificationKind::Success => self.success.as_ref(),
            NotificationKind::Failure => self.failure.as_ref(),
            NotificationKind::Removal => self.removal.as_ref(),
        }
    }

    /// Iterate over configured templates with their kind
    pub fn iter(&self) -> impl Iterator<Item = (NotificationKind, &T)> {
        [
            NotificationKind::Success,
            NotificationKind::Failure,
            NotificationKind::Removal,
        ]
        .into_iter()
        .filter_map(move |kind| self.get(kind).map(|t| (kind, t)))
    }
}

/// Delivery channel with its templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationChannel {
    /// In-world instant message; templates are inline strings
    InteractiveMessage(TemplateSet<String>),
    /// Email; templates are files read at send time
    TemplatedText(TemplateSet<PathBuf>),
}

impl NotificationChannel {
    /// Short channel name for logs
    pub fn name(&self) -> &'static str {
        match self {
            NotificationChannel::InteractiveMessage(_) => "IM",
            NotificationChannel::TemplatedText(_) => "Email",
        }
    }
}
