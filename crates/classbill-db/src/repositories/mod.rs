//! Repository implementations
//!
//! Concrete implementations of the collaborator traits defined in
//! classbill-core, using sqlx for PostgreSQL access.

pub mod job_repo;
pub mod ledger_repo;
pub mod listing_repo;
pub mod notification_repo;

pub use job_repo::PgJobRepository;
pub use ledger_repo::PgLedger;
pub use listing_repo::PgListingRepository;
pub use notification_repo::PgNotificationOutbox;
