//! Notification outbox
//!
//! Queues owner notifications in a table drained by the grid's messaging
//! service. Instant messages and emails share the table, told apart by
//! `channel`.

use classbill_core::{traits::NotificationSink, AppError, AppResult};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

const CHANNEL_IM: &str = "im";
const CHANNEL_EMAIL: &str = "email";

/// PostgreSQL implementation of NotificationSink
pub struct PgNotificationOutbox {
    pool: PgPool,
}

impl PgNotificationOutbox {
    /// Create a new outbox
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn enqueue(
        &self,
        channel: &str,
        recipient: Uuid,
        subject: Option<&str>,
        body: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_outbox (id, channel, recipient, subject, body)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(channel)
        .bind(recipient)
        .bind(subject)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to queue {} notification for {}: {}", channel, recipient, e);
            AppError::Notification(format!("Failed to queue notification: {}", e))
        })?;

        debug!("Queued {} notification for {}", channel, recipient);
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for PgNotificationOutbox {
    #[instrument(skip(self, text))]
    async fn send_instant_message(&self, recipient: Uuid, text: &str) -> AppResult<()> {
        self.enqueue(CHANNEL_IM, recipient, None, text).await
    }

    #[instrument(skip(self, body))]
    async fn send_email(&self, recipient: Uuid, subject: &str, body: &str) -> AppResult<()> {
        self.enqueue(CHANNEL_EMAIL, recipient, Some(subject), body).await
    }
}
