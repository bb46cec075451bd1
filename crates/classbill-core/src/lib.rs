//! Classified Billing Collector Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the classified billing collector. It includes:
//!
//! - Domain models (classified listings, scheduler jobs, billing job state)
//! - Collaborator traits for the listing store, scheduler, ledger and notifications
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
