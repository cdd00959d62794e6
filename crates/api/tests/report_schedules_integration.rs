//! Integration tests for report schedule endpoints and the dispatcher.
//!
//! Runs the full router over the in-memory backend.
//!
//! Run with: cargo test --test report_schedules_integration

mod common;

use axum::http::{Method, StatusCode};
use chrono::{DateTime, Utc};
use common::{
    create_schedule, empty_request, json_request, parse_response_body, test_config,
    unique_test_email, weekly_schedule_payload, TestApp,
};
use std::time::Duration;
use domain::models::{ReportItem, ReportType};
use serde_json::{json, Value};
use tower::ServiceExt;

fn sample_items() -> Vec<ReportItem> {
    serde_json::from_value(json!([
        {
            "id": "1", "reference": "AT-1", "name": "ThinkPad",
            "status": "Deployed", "category": "Laptop", "cost": "1200.00"
        },
        {
            "id": "2", "reference": "AT-2", "name": "Monitor",
            "status": "Ready", "category": "Monitor", "cost": "300.50"
        }
    ]))
    .unwrap()
}

fn timestamp(value: &Value) -> DateTime<Utc> {
    value
        .as_str()
        .expect("timestamp string")
        .parse()
        .expect("RFC 3339 timestamp")
}

// ============================================================================
// Schedule CRUD
// ============================================================================

#[tokio::test]
async fn test_create_schedule_success() {
    let app = TestApp::new();

    let mut request = json_request(
        Method::POST,
        "/api/v1/report-schedules",
        weekly_schedule_payload(),
    );
    request
        .headers_mut()
        .insert("x-user-id", "ops-admin".parse().unwrap());

    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = parse_response_body(response).await;
    assert!(body.get("id").is_some());
    assert_eq!(body["report_type"], "assets");
    assert_eq!(body["frequency"], "weekly");
    assert_eq!(body["scheduled_time"], "08:00");
    assert_eq!(body["schedule_description"], "Weekly on Monday at 08:00");
    assert_eq!(body["created_by"], "ops-admin");
    assert_eq!(body["is_active"], true);
    assert!(body["last_sent_at"].is_null());

    let next_run = timestamp(&body["next_run_at"]);
    assert!(next_run > Utc::now());
}

#[tokio::test]
async fn test_create_schedule_normalizes_recipients() {
    let app = TestApp::new();
    let email = unique_test_email();

    let mut payload = weekly_schedule_payload();
    payload["email_recipients"] = json!([
        format!("  {}  ", email),
        email.to_uppercase(),
    ]);

    let body = create_schedule(&app, payload).await;
    assert_eq!(body["email_recipients"], json!([email]));
}

#[tokio::test]
async fn test_create_schedule_weekly_requires_day() {
    let app = TestApp::new();

    let mut payload = weekly_schedule_payload();
    payload.as_object_mut().unwrap().remove("frequency_day");

    let response = app
        .router()
        .oneshot(json_request(Method::POST, "/api/v1/report-schedules", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_create_schedule_rejects_invalid_email() {
    let app = TestApp::new();

    let mut payload = weekly_schedule_payload();
    payload["email_recipients"] = json!(["not-an-email"]);

    let response = app
        .router()
        .oneshot(json_request(Method::POST, "/api/v1/report-schedules", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_schedule_rejects_empty_recipients() {
    let app = TestApp::new();

    let mut payload = weekly_schedule_payload();
    payload["email_recipients"] = json!([]);

    let response = app
        .router()
        .oneshot(json_request(Method::POST, "/api/v1/report-schedules", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_schedules_with_filters() {
    let app = TestApp::new();

    create_schedule(&app, weekly_schedule_payload()).await;

    let mut maintenance = weekly_schedule_payload();
    maintenance["report_type"] = json!("maintenance");
    maintenance["is_active"] = json!(false);
    create_schedule(&app, maintenance).await;

    let response = app
        .router()
        .oneshot(empty_request(Method::GET, "/api/v1/report-schedules"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["total"], 2);

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/report-schedules?active=true",
        ))
        .await
        .unwrap();
    let body = parse_response_body(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["schedules"][0]["report_type"], "assets");

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            "/api/v1/report-schedules?report_type=maintenance",
        ))
        .await
        .unwrap();
    let body = parse_response_body(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["schedules"][0]["is_active"], false);
}

#[tokio::test]
async fn test_get_schedule_not_found() {
    let app = TestApp::new();

    let uri = format!("/api/v1/report-schedules/{}", uuid::Uuid::new_v4());
    let response = app
        .router()
        .oneshot(empty_request(Method::GET, &uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_update_name_keeps_next_run() {
    let app = TestApp::new();
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .router()
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/report-schedules/{}", id),
            json!({ "report_name": "Renamed report" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["report_name"], "Renamed report");
    assert_eq!(body["next_run_at"], created["next_run_at"]);
}

#[tokio::test]
async fn test_update_frequency_recomputes_next_run() {
    let app = TestApp::new();
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .router()
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/report-schedules/{}", id),
            json!({ "frequency": "daily", "scheduled_time": "23:59" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["frequency"], "daily");
    assert!(body["frequency_day"].is_null());
    assert_eq!(body["schedule_description"], "Daily at 23:59");

    let next_run = timestamp(&body["next_run_at"]);
    assert!(next_run > Utc::now());
    assert!(next_run <= Utc::now() + chrono::Duration::days(1));
}

#[tokio::test]
async fn test_update_monthly_rejects_out_of_range_day() {
    let app = TestApp::new();
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .router()
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/report-schedules/{}", id),
            json!({ "frequency": "monthly", "frequency_day": 32 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_toggle_schedule_keeps_next_run() {
    let app = TestApp::new();
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();
    let uri = format!("/api/v1/report-schedules/{}/toggle", id);

    let response = app
        .router()
        .oneshot(empty_request(Method::POST, &uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["is_active"], false);
    assert_eq!(body["next_run_at"], created["next_run_at"]);

    let response = app
        .router()
        .oneshot(empty_request(Method::POST, &uri))
        .await
        .unwrap();
    let body = parse_response_body(response).await;
    assert_eq!(body["is_active"], true);
}

#[tokio::test]
async fn test_delete_schedule() {
    let app = TestApp::new();
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let uri = format!("/api/v1/report-schedules/{}", created["id"].as_str().unwrap());

    let response = app
        .router()
        .oneshot(empty_request(Method::DELETE, &uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .router()
        .oneshot(empty_request(Method::GET, &uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router()
        .oneshot(empty_request(Method::DELETE, &uri))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Test send and run now
// ============================================================================

#[tokio::test]
async fn test_send_test_to_override_recipients() {
    let app = TestApp::new();
    app.data_source.set_items(ReportType::Assets, sample_items());
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();
    let override_email = unique_test_email();

    let response = app
        .router()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/report-schedules/{}/test", id),
            json!({ "recipients": [override_email] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["run"]["kind"], "test");
    assert_eq!(body["run"]["outcome"], "success");
    assert_eq!(body["run"]["recipient_count"], 1);
    assert!(body["schedule"]["last_sent_at"].is_null());
    assert_eq!(body["schedule"]["next_run_at"], created["next_run_at"]);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec![override_email]);
    assert!(sent[0].subject.starts_with("[TEST] "));
    assert!(sent[0].subject.ends_with("(Assets report)"));
    assert!(sent[0].attachment.filename.starts_with("assets-report-"));
    assert!(sent[0].attachment.filename.ends_with(".csv"));
    assert!(sent[0].body_text.contains("Total items: 2"));
}

#[tokio::test]
async fn test_send_test_without_body_uses_schedule_recipients() {
    let app = TestApp::new();
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .router()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/report-schedules/{}/test", id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        json!(sent[0].recipients),
        created["email_recipients"].clone()
    );
}

#[tokio::test]
async fn test_send_test_rejects_blank_override() {
    let app = TestApp::new();
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .router()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/report-schedules/{}/test", id),
            json!({ "recipients": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_run_now_records_history_without_advancing() {
    let app = TestApp::new();
    app.data_source.set_items(ReportType::Assets, sample_items());
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .router()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/report-schedules/{}/run", id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["run"]["kind"], "run_now");
    assert_eq!(body["run"]["outcome"], "success");

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/report-schedules/{}", id),
        ))
        .await
        .unwrap();
    let schedule = parse_response_body(response).await;
    assert!(schedule["last_sent_at"].is_null());
    assert_eq!(schedule["next_run_at"], created["next_run_at"]);

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/report-schedules/{}/runs", id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let runs = parse_response_body(response).await;
    assert_eq!(runs["total"], 1);
    assert_eq!(runs["runs"][0]["kind"], "run_now");
}

#[tokio::test]
async fn test_run_now_delivery_failure_is_recorded() {
    let app = TestApp::new();
    app.mailer.fail_with(Some("relay refused"));
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .router()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/report-schedules/{}/run", id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["run"]["outcome"], "failure");
    assert_eq!(body["run"]["failure_stage"], "delivery");
    assert!(body["run"]["error_detail"]
        .as_str()
        .unwrap()
        .contains("relay refused"));
}

#[tokio::test]
async fn test_run_now_missing_schedule() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/report-schedules/{}/run", uuid::Uuid::new_v4()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// One-second send timeout and two-second request budget.
fn app_with_short_timeouts() -> TestApp {
    let mut config = test_config();
    config.server.request_timeout_secs = 2;
    config.dispatcher.send_timeout_secs = 1;
    TestApp::with_config(config)
}

async fn run_history(app: &TestApp, id: &str) -> Value {
    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/report-schedules/{}/runs", id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    parse_response_body(response).await
}

#[tokio::test]
async fn test_send_test_stalled_mailer_reports_timeout_failure() {
    let app = app_with_short_timeouts();
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();
    app.mailer.stall_for(Some(Duration::from_secs(5)));

    let response = app
        .router()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/report-schedules/{}/test", id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["run"]["kind"], "test");
    assert_eq!(body["run"]["outcome"], "failure");
    assert_eq!(body["run"]["failure_stage"], "delivery");
    assert!(body["run"]["error_detail"]
        .as_str()
        .unwrap()
        .contains("timed out"));

    let runs = run_history(&app, id).await;
    assert_eq!(runs["total"], 1);
}

#[tokio::test]
async fn test_run_now_is_recorded_when_client_gives_up() {
    let app = app_with_short_timeouts();
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();
    app.mailer.stall_for(Some(Duration::from_secs(5)));

    let request = app.router().oneshot(empty_request(
        Method::POST,
        &format!("/api/v1/report-schedules/{}/run", id),
    ));
    assert!(tokio::time::timeout(Duration::from_millis(200), request)
        .await
        .is_err());

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let runs = run_history(&app, id).await;
    assert_eq!(runs["total"], 1);
    assert_eq!(runs["runs"][0]["kind"], "run_now");
    assert_eq!(runs["runs"][0]["failure_stage"], "delivery");
}

// ============================================================================
// Clock-driven dispatch
// ============================================================================

#[tokio::test]
async fn test_dispatch_tick_sends_and_advances() {
    let app = TestApp::new();
    app.data_source.set_items(ReportType::Assets, sample_items());
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();
    let due_at = timestamp(&created["next_run_at"]);

    let before = app
        .state
        .dispatcher
        .tick(due_at - chrono::Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(before.due, 0);
    assert!(app.mailer.sent().is_empty());

    let summary = app.state.dispatcher.tick(due_at).await.unwrap();
    assert_eq!(summary.due, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(app.mailer.sent().len(), 1);

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/report-schedules/{}", id),
        ))
        .await
        .unwrap();
    let schedule = parse_response_body(response).await;
    assert!(!schedule["last_sent_at"].is_null());
    assert_eq!(
        timestamp(&schedule["next_run_at"]),
        due_at + chrono::Duration::days(7)
    );

    // The same occurrence is never sent twice.
    let again = app.state.dispatcher.tick(due_at).await.unwrap();
    assert_eq!(again.due, 0);
    assert_eq!(app.mailer.sent().len(), 1);

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/report-schedules/{}/runs?limit=10", id),
        ))
        .await
        .unwrap();
    let runs = parse_response_body(response).await;
    assert_eq!(runs["total"], 1);
    assert_eq!(runs["runs"][0]["kind"], "scheduled");
    assert_eq!(runs["runs"][0]["occurrence"], created["next_run_at"]);
}

#[tokio::test]
async fn test_dispatch_skips_paused_schedule() {
    let app = TestApp::new();
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();
    let due_at = timestamp(&created["next_run_at"]);

    let response = app
        .router()
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/report-schedules/{}/toggle", id),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let summary = app.state.dispatcher.tick(due_at).await.unwrap();
    assert_eq!(summary.due, 0);
    assert!(app.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_dispatch_failure_advances_without_last_sent() {
    let app = TestApp::new();
    app.data_source.set_unavailable(true);
    let created = create_schedule(&app, weekly_schedule_payload()).await;
    let id = created["id"].as_str().unwrap();
    let due_at = timestamp(&created["next_run_at"]);

    let summary = app.state.dispatcher.tick(due_at).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert!(app.mailer.sent().is_empty());

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/report-schedules/{}/runs", id),
        ))
        .await
        .unwrap();
    let runs = parse_response_body(response).await;
    assert_eq!(runs["runs"][0]["outcome"], "failure");
    assert_eq!(runs["runs"][0]["failure_stage"], "generation");

    let response = app
        .router()
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/report-schedules/{}", id),
        ))
        .await
        .unwrap();
    let schedule = parse_response_body(response).await;
    assert!(schedule["last_sent_at"].is_null());
    assert!(timestamp(&schedule["next_run_at"]) > due_at);
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_memory_backend() {
    let app = TestApp::new();

    let response = app
        .router()
        .oneshot(empty_request(Method::GET, "/api/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["backend"], "memory");
    assert_eq!(body["dispatcher_enabled"], false);

    let response = app
        .router()
        .oneshot(empty_request(Method::GET, "/api/health/ready"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
