//! Listing repository implementation
//!
//! PostgreSQL-backed directory store for classifieds. Enumeration is ordered
//! by `(created_at, id)` so offset paging is stable while listings are added.

use classbill_core::{
    models::{Classified, ClassifiedCategory, ClassifiedFlags, ListingSummary},
    traits::{ListingRepository, LISTING_PAGE_SIZE},
    AppError, AppResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of ListingRepository
pub struct PgListingRepository {
    pool: PgPool,
}

impl PgListingRepository {
    /// Create a new listing repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert a stored category code, falling back to `Any`
    fn parse_category(code: i32) -> ClassifiedCategory {
        ClassifiedCategory::from_code(code).unwrap_or_default()
    }
}

#[async_trait]
impl ListingRepository for PgListingRepository {
    #[instrument(skip(self))]
    async fn find_enabled(
        &self,
        category: ClassifiedCategory,
        flags: ClassifiedFlags,
        offset: i64,
    ) -> AppResult<Vec<ListingSummary>> {
        debug!(
            "Finding listings category={} flags={:#x} offset={}",
            category,
            flags.bits(),
            offset
        );

        let rows = sqlx::query_as::<sqlx::Postgres, SummaryRow>(
            r#"
            SELECT id, owner_id, created_at
            FROM classifieds
            WHERE ($1 = 0 OR category = $1)
              AND (flags & $2) = $2
            ORDER BY created_at, id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(category.code())
        .bind(flags.bits() as i32)
        .bind(LISTING_PAGE_SIZE)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing classifieds: {}", e);
            AppError::Database(format!("Failed to list classifieds: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Classified>> {
        debug!("Finding classified by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, ClassifiedRow>(
            r#"
            SELECT id, owner_id, name, price_per_period, flags, category, created_at
            FROM classifieds
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding classified {}: {}", id, e);
            AppError::Database(format!("Failed to find classified: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self, listing), fields(listing_id = %listing.id))]
    async fn persist(&self, listing: &Classified) -> AppResult<()> {
        debug!("Persisting flags {:#x}", listing.flags.bits());

        let result = sqlx::query("UPDATE classifieds SET flags = $2 WHERE id = $1")
            .bind(listing.id)
            .bind(listing.flags.bits() as i32)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error updating classified {}: {}", listing.id, e);
                AppError::Database(format!("Failed to update classified: {}", e))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Classified {}", listing.id)));
        }

        Ok(())
    }
}

/// Helper struct for mapping enumeration rows
#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    id: Uuid,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<SummaryRow> for ListingSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            created_at: row.created_at,
        }
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct ClassifiedRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    price_per_period: Decimal,
    flags: i32,
    category: i32,
    created_at: DateTime<Utc>,
}

impl From<ClassifiedRow> for Classified {
    fn from(row: ClassifiedRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            price_per_period: row.price_per_period,
            flags: ClassifiedFlags::from_bits(row.flags as u32),
            category: PgListingRepository::parse_category(row.category),
            created_at: row.created_at,
        }
    }
}
