//! Ledger implementation
//!
//! Debits owner balances for listing fees. The balance check and the debit
//! are a single conditional UPDATE, so a concurrent charge can never push a
//! balance below zero.

use classbill_core::{traits::Ledger, AppError, AppResult};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of Ledger
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Create a new ledger
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    #[instrument(skip(self))]
    async fn charge(&self, owner_id: Uuid, amount: Decimal, memo: &str) -> AppResult<bool> {
        if amount < Decimal::ZERO {
            return Err(AppError::InvalidInput(format!(
                "Cannot charge a negative amount: {}",
                amount
            )));
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            AppError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let remaining: Option<(Decimal,)> = sqlx::query_as(
            r#"
            UPDATE ledger_accounts
            SET balance = balance - $2,
                updated_at = NOW()
            WHERE owner_id = $1
              AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(owner_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error debiting {}: {}", owner_id, e);
            AppError::Database(format!("Failed to debit account: {}", e))
        })?;

        let Some((balance,)) = remaining else {
            debug!("Debit of {} refused for {}", amount, owner_id);
            return Ok(false);
        };

        sqlx::query(
            r#"
            INSERT INTO ledger_transactions (id, owner_id, amount, memo)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(-amount)
        .bind(memo)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error recording transaction for {}: {}", owner_id, e);
            AppError::Database(format!("Failed to record transaction: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!("Charged {} to {} ({}), balance now {}", amount, owner_id, memo, balance);
        Ok(true)
    }
}
