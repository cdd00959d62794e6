//! Common test utilities for integration tests.
//!
//! The harness runs the full router over the in-memory backend, so these
//! tests need no database. Mail goes to a `RecordingMailer`.

// Not every helper is used by every test binary.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use domain::services::{InMemoryReportDataSource, InMemoryScheduleStore, ScheduleStore};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use report_scheduler_api::app::{create_app, AppState};
use report_scheduler_api::config::{
    Config, DatabaseConfig, DispatcherConfig, EmailConfig, LoggingConfig, ReportsConfig,
    ServerConfig, StorageBackend, StorageConfig,
};
use report_scheduler_api::services::RecordingMailer;
use serde_json::{json, Value};
use std::sync::Arc;

/// Test configuration over the memory backend with the dispatcher job off.
pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 60,
        },
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout_secs: 10,
            idle_timeout_secs: 600,
        },
        logging: LoggingConfig {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            fixtures_path: None,
        },
        dispatcher: DispatcherConfig {
            enabled: false,
            ..DispatcherConfig::default()
        },
        email: EmailConfig {
            sender_email: "reports@example.com".to_string(),
            sender_name: "Reports".to_string(),
            ..EmailConfig::default()
        },
        reports: ReportsConfig {
            organization_name: "Integration Test Org".to_string(),
            max_itemized_rows: 100,
        },
    }
}

/// Application under test plus handles on its collaborators.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryScheduleStore>,
    pub data_source: Arc<InMemoryReportDataSource>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryScheduleStore::new(chrono::Duration::seconds(
            config.dispatcher.claim_lease_secs,
        )));
        let data_source = Arc::new(InMemoryReportDataSource::new());
        let mailer = Arc::new(RecordingMailer::new());

        let state = AppState::new(
            config,
            store.clone() as Arc<dyn ScheduleStore>,
            data_source.clone(),
            mailer.clone(),
            None,
        );

        Self {
            state,
            store,
            data_source,
            mailer,
        }
    }

    /// A fresh router over the shared state; `oneshot` consumes it.
    pub fn router(&self) -> Router {
        create_app(self.state.clone())
    }
}

/// Generate a unique recipient address.
pub fn unique_test_email() -> String {
    let email: String = SafeEmail().fake();
    format!("{}.{}", uuid::Uuid::new_v4().simple(), email)
}

/// A valid weekly CSV schedule payload.
pub fn weekly_schedule_payload() -> Value {
    let company: String = CompanyName().fake();
    json!({
        "report_name": format!("{} weekly assets", company),
        "report_type": "assets",
        "frequency": "weekly",
        "frequency_day": 1,
        "scheduled_time": "08:00",
        "email_recipients": [unique_test_email()],
        "format": "csv",
        "include_list": true
    })
}

/// Build a JSON request.
pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a request without a body.
pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

/// Create a schedule through the API and return the response body.
pub async fn create_schedule(app: &TestApp, payload: Value) -> Value {
    use tower::ServiceExt;

    let response = app
        .router()
        .oneshot(json_request(Method::POST, "/api/v1/report-schedules", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::CREATED);
    parse_response_body(response).await
}
