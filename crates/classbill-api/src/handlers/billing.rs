//! Billing handlers
//!
//! Operator endpoints for inspecting billing jobs and forcing a sweep.

use crate::dto::{ApiResponse, BillingJobResponse, PaginationParams, SweepResponse};
use actix_web::{web, HttpResponse};
use classbill_core::models::{BillingJobState, BILLING_JOB_KIND};
use classbill_core::traits::JobRepository;
use classbill_core::AppError;
use classbill_services::{DiscoverySweep, SweepOutcome};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// List billing jobs with pagination
///
/// GET /billing/jobs
#[instrument(skip(jobs))]
pub async fn list_jobs(
    jobs: web::Data<dyn JobRepository>,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    debug!(page = query.page, per_page = query.per_page, "Listing billing jobs");

    let (records, total) = jobs
        .list(Some(BILLING_JOB_KIND), query.limit(), query.offset())
        .await?;

    let data: Vec<BillingJobResponse> = records
        .into_iter()
        .filter_map(|job| {
            let id = job.id.clone();
            BillingJobResponse::from_job(job)
                .map_err(|e| warn!("Skipping billing job {}: {}", id, e))
                .ok()
        })
        .collect();

    Ok(HttpResponse::Ok().json(query.paginate(data, total)))
}

/// Get the billing job of one listing
///
/// GET /billing/jobs/{listing_id}
#[instrument(skip(jobs))]
pub async fn get_job(
    jobs: web::Data<dyn JobRepository>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let listing_id = path.into_inner();
    let key = BillingJobState::new(listing_id).job_key();

    let job = jobs
        .find_by_id(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No billing job for listing {}", listing_id)))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(BillingJobResponse::from_job(job)?)))
}

/// Run a discovery sweep now
///
/// POST /billing/sweep
#[instrument(skip(sweep))]
pub async fn trigger_sweep(
    sweep: Option<web::Data<DiscoverySweep>>,
) -> Result<HttpResponse, AppError> {
    let sweep = sweep.ok_or_else(|| {
        AppError::CollaboratorUnavailable("Classified billing is disabled".to_string())
    })?;

    let outcome = sweep.run_once().await;
    match outcome {
        SweepOutcome::AlreadyRunning => {
            Err(AppError::Conflict("A discovery sweep is already running".to_string()))
        }
        SweepOutcome::Skipped => Err(AppError::CollaboratorUnavailable(
            "Listing store unavailable".to_string(),
        )),
        SweepOutcome::Completed(_) => {
            info!("Manual discovery sweep completed");
            Ok(HttpResponse::Ok().json(ApiResponse::success(SweepResponse::from(outcome))))
        }
    }
}

/// Configure billing routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/billing")
            .route("/jobs", web::get().to(list_jobs))
            .route("/jobs/{listing_id}", web::get().to(get_job))
            .route("/sweep", web::post().to(trigger_sweep)),
    );
}
