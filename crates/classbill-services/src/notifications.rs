//! Owner notifications
//!
//! Resolves the text for a billing event from the configured channel and
//! hands it to the notification sink. IM templates are inline strings;
//! Email templates are files read at send time, so operators can edit them
//! without a restart.
//!
//! Templates may use these placeholders:
//! `{listing}`, `{amount}`, `{failures}`, `{max_retries}`.

use classbill_core::{
    models::{Classified, NotificationChannel, NotificationKind},
    traits::NotificationSink,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Values substituted into a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContext {
    pub listing: String,
    pub amount: Decimal,
    pub failures: u32,
    pub max_retries: u32,
}

impl NotificationContext {
    pub fn for_listing(listing: &Classified, failures: u32, max_retries: u32) -> Self {
        Self {
            listing: listing.name.clone(),
            amount: listing.price_per_period,
            failures,
            max_retries,
        }
    }
}

/// Substitute context values into a template
pub fn render_template(template: &str, ctx: &NotificationContext) -> String {
    template
        .replace("{listing}", &ctx.listing)
        .replace("{amount}", &ctx.amount.to_string())
        .replace("{failures}", &ctx.failures.to_string())
        .replace("{max_retries}", &ctx.max_retries.to_string())
}

/// Looks up the template text for a notification kind
#[derive(Debug, Clone)]
pub struct NotificationResolver {
    channel: NotificationChannel,
}

impl NotificationResolver {
    pub fn new(channel: NotificationChannel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &NotificationChannel {
        &self.channel
    }

    /// Template text for `kind`
    ///
    /// `Ok(None)` when the channel has no template for this kind, or the
    /// template is empty. File read failures are errors.
    pub async fn resolve(&self, kind: NotificationKind) -> AppResult<Option<String>> {
        let text = match &self.channel {
            NotificationChannel::InteractiveMessage(templates) => templates.get(kind).cloned(),
            NotificationChannel::TemplatedText(templates) => match templates.get(kind) {
                Some(path) => Some(tokio::fs::read_to_string(path).await.map_err(|e| {
                    AppError::Template(format!(
                        "Failed to read {} template {}: {}",
                        kind,
                        path.display(),
                        e
                    ))
                })?),
                None => None,
            },
        };

        Ok(text.filter(|t| !t.trim().is_empty()))
    }
}

/// Sends rendered notifications to listing owners
///
/// Delivery problems are logged and swallowed; a missed notification never
/// changes the billing outcome.
#[derive(Clone)]
pub struct Notifier {
    resolver: NotificationResolver,
    sink: Arc<dyn NotificationSink>,
    enabled: Vec<NotificationKind>,
}

impl Notifier {
    /// Create a notifier that reports the given event kinds
    pub fn new(
        resolver: NotificationResolver,
        sink: Arc<dyn NotificationSink>,
        enabled: impl IntoIterator<Item = NotificationKind>,
    ) -> Self {
        Self {
            resolver,
            sink,
            enabled: enabled.into_iter().collect(),
        }
    }

    pub fn is_enabled(&self, kind: NotificationKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Tell the listing owner about `kind`
    ///
    /// Returns whether a notification was handed to the sink.
    #[instrument(skip(self, listing, ctx), fields(listing_id = %listing.id))]
    pub async fn notify(
        &self,
        kind: NotificationKind,
        listing: &Classified,
        ctx: &NotificationContext,
    ) -> bool {
        if !self.is_enabled(kind) {
            return false;
        }

        let template = match self.resolver.resolve(kind).await {
            Ok(Some(template)) => template,
            Ok(None) => {
                debug!("No {} template for channel {}", kind, self.resolver.channel().name());
                return false;
            }
            Err(e) => {
                error!("Skipping {} notification: {}", kind, e);
                return false;
            }
        };

        let body = render_template(&template, ctx);
        let sent = match self.resolver.channel() {
            NotificationChannel::InteractiveMessage(_) => {
                self.sink.send_instant_message(listing.owner_id, &body).await
            }
            NotificationChannel::TemplatedText(_) => {
                self.sink
                    .send_email(listing.owner_id, kind.subject(), &body)
                    .await
            }
        };

        match sent {
            Ok(()) => {
                debug!("Sent {} notification to {}", kind, listing.owner_id);
                true
            }
            Err(e) => {
                error!("Failed to send {} notification to {}: {}", kind, listing.owner_id, e);
                false
            }
        }
    }
}
