use anyhow::{Context, Result};
use domain::services::{
    InMemoryReportDataSource, InMemoryScheduleStore, ReportDataSource, ScheduleStore,
};
use persistence::repositories::{ReportItemRepository, ReportScheduleRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use report_scheduler_api::app::{create_app, AppState};
use report_scheduler_api::config::{Config, StorageBackend};
use report_scheduler_api::jobs::{
    JobScheduler, PoolMetricsJob, ReportDispatchJob, RunHistoryCleanupJob,
};
use report_scheduler_api::middleware::{init_metrics, logging::init_logging};
use report_scheduler_api::services::build_mailer;

/// How long in-flight jobs get to finish after a shutdown signal.
const JOB_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);
    init_metrics().context("Failed to install Prometheus recorder")?;

    info!("Starting Report Scheduler v{}", env!("CARGO_PKG_VERSION"));

    let lease = chrono::Duration::seconds(config.dispatcher.claim_lease_secs);
    let store: Arc<dyn ScheduleStore>;
    let data_source: Arc<dyn ReportDataSource>;
    let pool = match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = persistence::db::create_pool(&(&config.database).into()).await?;

            info!("Running database migrations...");
            persistence::MIGRATOR.run(&pool).await?;
            info!("Migrations completed");

            store = Arc::new(ReportScheduleRepository::new(pool.clone(), lease));
            data_source = Arc::new(ReportItemRepository::new(pool.clone()));
            Some(pool)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; schedules are lost on restart");
            let fixtures = match &config.storage.fixtures_path {
                Some(path) => InMemoryReportDataSource::from_json_file(path)
                    .with_context(|| format!("Failed to load report fixtures from {}", path))?,
                None => InMemoryReportDataSource::new(),
            };
            store = Arc::new(InMemoryScheduleStore::new(lease));
            data_source = Arc::new(fixtures);
            None
        }
    };

    let mailer = build_mailer(&config.email)?;
    let state = AppState::new(config.clone(), store.clone(), data_source, mailer, pool.clone());

    // Background jobs
    let mut scheduler = JobScheduler::new();
    if config.dispatcher.enabled {
        scheduler.register(ReportDispatchJob::new(
            state.dispatcher.clone(),
            config.dispatcher.poll_interval_secs,
        ));
    } else {
        info!("Report dispatcher disabled in this process");
    }
    scheduler.register(RunHistoryCleanupJob::new(
        store,
        config.dispatcher.run_retention_days,
    ));
    if let Some(pool) = pool {
        scheduler.register(PoolMetricsJob::new(pool));
    }
    scheduler.start();

    // Build application
    let app = create_app(state);

    // Start server
    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, waiting for background jobs");
    scheduler.shutdown();
    scheduler.wait_for_shutdown(JOB_SHUTDOWN_TIMEOUT).await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
