//! Classified Billing Database Layer
//!
//! This crate provides PostgreSQL implementations of the collaborator traits
//! defined in classbill-core:
//!
//! - Connection pool management and migrations with sqlx
//! - Directory listing store
//! - Scheduler job table with `SKIP LOCKED` claiming of due jobs
//! - Owner ledger with atomic, balance-checked debits
//! - Notification outbox

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use classbill_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
