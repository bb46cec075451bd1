//! Scheduler job repository implementation
//!
//! Stores one row per job key. Due jobs are claimed with
//! `FOR UPDATE SKIP LOCKED` and advanced inside the same transaction, so
//! concurrent dispatchers never fire the same due time twice.

use classbill_core::{
    models::{RepeatInterval, ScheduledJob},
    traits::JobRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};

const REPEAT_MONTHS: &str = "months";
const REPEAT_SECONDS: &str = "seconds";

/// PostgreSQL implementation of JobRepository
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    /// Create a new job repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Split a repeat interval into its stored columns
    fn repeat_columns(repeat: Option<RepeatInterval>) -> (Option<&'static str>, Option<i64>) {
        match repeat {
            Some(RepeatInterval::Months(m)) => (Some(REPEAT_MONTHS), Some(i64::from(m))),
            Some(RepeatInterval::Seconds(s)) => (Some(REPEAT_SECONDS), Some(s)),
            None => (None, None),
        }
    }

    /// Rebuild a repeat interval from its stored columns
    fn parse_repeat(unit: Option<&str>, every: Option<i64>) -> Option<RepeatInterval> {
        match (unit, every) {
            (Some(REPEAT_MONTHS), Some(m)) => u32::try_from(m).ok().map(RepeatInterval::Months),
            (Some(REPEAT_SECONDS), Some(s)) => Some(RepeatInterval::Seconds(s)),
            _ => None,
        }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    #[instrument(skip(self))]
    async fn exists(&self, job_id: &str) -> AppResult<bool> {
        let result: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM scheduler_jobs WHERE id = $1)")
                .bind(job_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error checking job {}: {}", job_id, e);
                    AppError::Database(format!("Failed to check job: {}", e))
                })?;

        Ok(result.0)
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, job_id: &str) -> AppResult<Option<ScheduledJob>> {
        let result = sqlx::query_as::<sqlx::Postgres, JobRow>(
            r#"
            SELECT id, kind, payload, next_fire_at, repeat_unit, repeat_every,
                   created_at, updated_at
            FROM scheduler_jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding job {}: {}", job_id, e);
            AppError::Database(format!("Failed to find job: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, kind = %job.kind))]
    async fn save(&self, job: &ScheduledJob) -> AppResult<()> {
        debug!("Saving job, next fire at {}", job.next_fire_at);

        let (repeat_unit, repeat_every) = Self::repeat_columns(job.repeat);

        sqlx::query(
            r#"
            INSERT INTO scheduler_jobs (
                id, kind, payload, next_fire_at, repeat_unit, repeat_every,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (id) DO UPDATE
            SET kind = EXCLUDED.kind,
                payload = EXCLUDED.payload,
                next_fire_at = EXCLUDED.next_fire_at,
                repeat_unit = EXCLUDED.repeat_unit,
                repeat_every = EXCLUDED.repeat_every,
                updated_at = NOW()
            "#,
        )
        .bind(&job.id)
        .bind(&job.kind)
        .bind(&job.payload)
        .bind(job.next_fire_at)
        .bind(repeat_unit)
        .bind(repeat_every)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error saving job {}: {}", job.id, e);
            AppError::Database(format!("Failed to save job: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, job_id: &str) -> AppResult<bool> {
        debug!("Removing job: {}", job_id);

        let result = sqlx::query("DELETE FROM scheduler_jobs WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error removing job {}: {}", job_id, e);
                AppError::Database(format!("Failed to remove job: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        kinds: &[String],
        limit: i64,
    ) -> AppResult<Vec<ScheduledJob>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let rows = sqlx::query_as::<sqlx::Postgres, JobRow>(
            r#"
            SELECT id, kind, payload, next_fire_at, repeat_unit, repeat_every,
                   created_at, updated_at
            FROM scheduler_jobs
            WHERE next_fire_at <= $1 AND kind = ANY($3)
            ORDER BY next_fire_at
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(limit)
        .bind(kinds)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to select due jobs: {}", e);
            AppError::Database(format!("Failed to select due jobs: {}", e))
        })?;

        let mut claimed = Vec::with_capacity(rows.len());

        for row in rows {
            let mut job: ScheduledJob = row.into();

            if job.advance(now) {
                sqlx::query(
                    "UPDATE scheduler_jobs SET next_fire_at = $2, updated_at = NOW() WHERE id = $1",
                )
                .bind(&job.id)
                .bind(job.next_fire_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Failed to advance job {}: {}", job.id, e);
                    AppError::Database(format!("Failed to advance job: {}", e))
                })?;
            } else {
                if job.repeat.is_some() {
                    warn!("Job {} has an unusable repeat interval, discarding", job.id);
                }
                sqlx::query("DELETE FROM scheduler_jobs WHERE id = $1")
                    .bind(&job.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        error!("Failed to discard job {}: {}", job.id, e);
                        AppError::Database(format!("Failed to discard job: {}", e))
                    })?;
            }

            claimed.push(job);
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        if !claimed.is_empty() {
            debug!("Claimed {} due jobs", claimed.len());
        }

        Ok(claimed)
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        kind: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<ScheduledJob>, i64)> {
        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM scheduler_jobs WHERE ($1::TEXT IS NULL OR kind = $1)")
                .bind(kind)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error counting jobs: {}", e);
                    AppError::Database(format!("Failed to count jobs: {}", e))
                })?;

        let rows = sqlx::query_as::<sqlx::Postgres, JobRow>(
            r#"
            SELECT id, kind, payload, next_fire_at, repeat_unit, repeat_every,
                   created_at, updated_at
            FROM scheduler_jobs
            WHERE ($1::TEXT IS NULL OR kind = $1)
            ORDER BY next_fire_at, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(kind)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing jobs: {}", e);
            AppError::Database(format!("Failed to list jobs: {}", e))
        })?;

        Ok((rows.into_iter().map(Into::into).collect(), total.0))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    kind: String,
    payload: serde_json::Value,
    next_fire_at: DateTime<Utc>,
    repeat_unit: Option<String>,
    repeat_every: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for ScheduledJob {
    fn from(row: JobRow) -> Self {
        Self {
            repeat: PgJobRepository::parse_repeat(row.repeat_unit.as_deref(), row.repeat_every),
            id: row.id,
            kind: row.kind,
            payload: row.payload,
            next_fire_at: row.next_fire_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
