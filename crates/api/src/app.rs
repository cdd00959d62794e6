use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use chrono_tz::Tz;
use domain::services::{ReportDataSource, ScheduleManager, ScheduleStore};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{health, report_schedules};
use crate::services::{Dispatcher, DispatcherSettings, Mailer, ReportGenerator};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ScheduleManager>,
    pub dispatcher: Dispatcher,
    pub store: Arc<dyn ScheduleStore>,
    /// Present only for the postgres backend.
    pub pool: Option<PgPool>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the schedule manager and dispatcher over the given collaborators.
    pub fn new(
        config: Config,
        store: Arc<dyn ScheduleStore>,
        data_source: Arc<dyn ReportDataSource>,
        mailer: Arc<dyn Mailer>,
        pool: Option<PgPool>,
    ) -> Self {
        let tz: Tz = config.dispatcher.tz();
        let generator = ReportGenerator::new(data_source, config.reports.clone());
        let settings = DispatcherSettings {
            max_concurrency: config.dispatcher.max_concurrency,
            send_timeout: Duration::from_secs(config.dispatcher.send_timeout_secs),
            subject_prefix: config.email.subject_prefix.clone(),
        };

        Self {
            manager: Arc::new(ScheduleManager::new(store.clone(), tz)),
            dispatcher: Dispatcher::new(store.clone(), generator, mailer, tz, settings),
            store,
            pool,
            config: Arc::new(config),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    // Test send and run now generate and mail inside the request, so they get
    // the send timeout on top of the regular budget.
    let delivery_timeout =
        request_timeout + Duration::from_secs(state.config.dispatcher.send_timeout_secs);

    let schedule_routes = Router::new()
        .route(
            "/api/v1/report-schedules",
            post(report_schedules::create_schedule).get(report_schedules::list_schedules),
        )
        .route(
            "/api/v1/report-schedules/:id",
            get(report_schedules::get_schedule)
                .put(report_schedules::update_schedule)
                .delete(report_schedules::delete_schedule),
        )
        .route(
            "/api/v1/report-schedules/:id/toggle",
            post(report_schedules::toggle_schedule),
        )
        .route(
            "/api/v1/report-schedules/:id/runs",
            get(report_schedules::list_runs),
        );

    let delivery_routes = Router::new()
        .route(
            "/api/v1/report-schedules/:id/test",
            post(report_schedules::test_send),
        )
        .route(
            "/api/v1/report-schedules/:id/run",
            post(report_schedules::run_now),
        )
        .layer(TimeoutLayer::new(delivery_timeout));

    // Public routes
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(schedule_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .merge(delivery_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
