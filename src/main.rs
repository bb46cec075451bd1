//! Classified billing collector
//!
//! Charges classified listing owners once per billing period, retries failed
//! charges and takes listings down when retries run out. Also serves a small
//! admin API for inspecting billing jobs.

use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::Context;
use classbill_api::configure_billing;
use classbill_core::traits::{JobRepository, Ledger, ListingRepository, NotificationSink};
use classbill_core::AppConfig;
use classbill_db::{
    create_pool, run_migrations, PgJobRepository, PgLedger, PgListingRepository,
    PgNotificationOutbox,
};
use classbill_services::{Collaborators, Collector, JobDispatcher};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "classbill",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Configure API routes
fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .configure(configure_billing),
    );
}

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "classbill={},classbill_services={},classbill_db={},classbill_api={},actix_web=info,sqlx=warn",
            log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting classbill v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("Failed to load configuration")?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .context("Failed to create database pool")?;
    run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let jobs: Arc<dyn JobRepository> = Arc::new(PgJobRepository::new(pool.clone()));
    let listings: Arc<dyn ListingRepository> = Arc::new(PgListingRepository::new(pool.clone()));
    let ledger: Arc<dyn Ledger> = Arc::new(PgLedger::new(pool.clone()));
    let notifications: Arc<dyn NotificationSink> = Arc::new(PgNotificationOutbox::new(pool));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = Vec::new();

    let dispatcher = Arc::new(JobDispatcher::new(
        jobs.clone(),
        config.scheduler.batch_size,
    ));

    let collector = Collector::from_config(
        &config.billing,
        Collaborators {
            listings: Some(listings),
            jobs: jobs.clone(),
            ledger: Some(ledger),
            notifications,
        },
    );

    // Without a collector nothing polls, so due billing jobs stay where they are
    let sweep = collector.as_ref().map(|collector| {
        background.push(collector.start(&dispatcher, shutdown_rx.clone()));
        background.push(tokio::spawn(dispatcher.clone().run(
            Duration::from_secs(config.scheduler.poll_interval_secs.max(1)),
            shutdown_rx.clone(),
        )));
        web::Data::from(collector.sweep())
    });
    if sweep.is_none() {
        info!("Classified billing is off, job dispatcher not started");
    }

    let bind_addr = config.server_addr();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
    );

    let job_data = web::Data::from(jobs);
    let served = HttpServer::new(move || {
        let app = App::new()
            .app_data(job_data.clone())
            .wrap(TracingLogger::default())
            .configure(configure_routes);

        match sweep.clone() {
            Some(sweep) => app.app_data(sweep),
            None => app,
        }
    })
    .workers(config.server.workers.max(1))
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await;

    info!("HTTP server stopped, shutting down background tasks");
    let _ = shutdown_tx.send(true);
    for task in background {
        if let Err(e) = task.await {
            error!("Background task ended abnormally: {}", e);
        }
    }

    served.context("HTTP server failed")
}
