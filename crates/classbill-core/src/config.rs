//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::error::AppError;
use crate::models::{NotificationChannel, NotificationKind, RepeatInterval, TemplateSet};

/// Accepted `billing.retry_delay_secs`: one minute up to one year
pub const RETRY_DELAY_SECS_RANGE: std::ops::RangeInclusive<u64> = 60..=366 * 24 * 3600;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub billing: BillingConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9010
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Job dispatcher configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// How often due jobs are polled, in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Maximum jobs claimed per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_batch_size() -> i64 {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
        }
    }
}

/// Which channel owners are notified on
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelKind {
    #[default]
    #[serde(rename = "IM", alias = "im", alias = "Im")]
    InstantMessage,
    #[serde(rename = "Email", alias = "email", alias = "EMAIL")]
    Email,
}

/// Classified billing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Master switch for the collector
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between discovery sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Length of one billing period in calendar months
    #[serde(default = "default_period_months")]
    pub period_months: u32,

    /// Failed charges tolerated before the listing is removed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Retry a failed charge after this many seconds instead of waiting a
    /// whole period. Must lie within `RETRY_DELAY_SECS_RANGE`.
    #[serde(default)]
    pub retry_delay_secs: Option<u64>,

    #[serde(default)]
    pub notify_on_success: bool,

    #[serde(default = "default_enabled")]
    pub notify_on_failure: bool,

    #[serde(default = "default_enabled")]
    pub notify_on_removal: bool,

    /// Notification channel
    #[serde(default)]
    pub channel: ChannelKind,

    /// Inline message templates for the IM channel
    #[serde(default = "default_im_templates")]
    pub im_templates: TemplateSet<String>,

    /// Template file paths for the Email channel
    #[serde(default)]
    pub email_templates: TemplateSet<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    120
}

fn default_period_months() -> u32 {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_im_templates() -> TemplateSet<String> {
    TemplateSet {
        success: Some(
            "Your classified \"{listing}\" has been renewed. {amount} was charged.".to_string(),
        ),
        failure: Some(
            "We could not charge {amount} for your classified \"{listing}\" \
             (attempt {failures} of {max_retries}). Please top up your balance."
                .to_string(),
        ),
        removal: Some(
            "Your classified \"{listing}\" was removed after {failures} failed payments."
                .to_string(),
        ),
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: default_sweep_interval(),
            period_months: default_period_months(),
            max_retries: default_max_retries(),
            retry_delay_secs: None,
            notify_on_success: false,
            notify_on_failure: true,
            notify_on_removal: true,
            channel: ChannelKind::InstantMessage,
            im_templates: default_im_templates(),
            email_templates: TemplateSet::default(),
        }
    }
}

impl BillingConfig {
    /// Repeat interval of a billing job
    pub fn billing_period(&self) -> RepeatInterval {
        RepeatInterval::Months(self.period_months)
    }

    /// Whether owners are told about `kind` events
    pub fn notifies(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::Success => self.notify_on_success,
            NotificationKind::Failure => self.notify_on_failure,
            NotificationKind::Removal => self.notify_on_removal,
        }
    }

    /// The configured channel with its templates
    pub fn notification_channel(&self) -> NotificationChannel {
        match self.channel {
            ChannelKind::InstantMessage => {
                NotificationChannel::InteractiveMessage(self.im_templates.clone())
            }
            ChannelKind::Email => NotificationChannel::TemplatedText(self.email_templates.clone()),
        }
    }

    /// Check the configuration is usable
    ///
    /// Under the Email channel every configured template file must exist;
    /// the collector refuses to run with partial notification capability.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.period_months == 0 {
            return Err(AppError::Config(
                "billing.period_months must be at least 1".to_string(),
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(AppError::Config(
                "billing.sweep_interval_secs must be at least 1".to_string(),
            ));
        }

        if let Some(secs) = self.retry_delay_secs {
            if !RETRY_DELAY_SECS_RANGE.contains(&secs) {
                return Err(AppError::Config(format!(
                    "billing.retry_delay_secs must be between {} and {}, got {}",
                    RETRY_DELAY_SECS_RANGE.start(),
                    RETRY_DELAY_SECS_RANGE.end(),
                    secs
                )));
            }
        }

        if self.channel == ChannelKind::Email {
            for (kind, path) in self.email_templates.iter() {
                if !path.is_file() {
                    return Err(AppError::Config(format!(
                        "{} email template not found: {}",
                        kind,
                        path.display()
                    )));
                }
            }
        }

        Ok(())
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 9010)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("scheduler.poll_interval_secs", 5)?
            .set_default("scheduler.batch_size", 100)?
            .set_default("billing.enabled", true)?
            .set_default("billing.sweep_interval_secs", 120)?
            .set_default("billing.period_months", 1)?
            .set_default("billing.max_retries", 3)?
            .set_default("billing.channel", "IM")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with CLASSBILL_ prefix
            .add_source(
                Environment::with_prefix("CLASSBILL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
