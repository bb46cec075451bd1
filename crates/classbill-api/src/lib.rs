//! Admin API for classified billing
//!
//! HTTP handlers for inspecting billing jobs and triggering discovery sweeps.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;

// Re-export DTOs (common types)
pub use dto::{ApiResponse, PaginationParams};

pub use handlers::configure_billing;
