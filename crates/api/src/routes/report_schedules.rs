//! Report schedule endpoint handlers.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use domain::models::{
    CreateReportScheduleRequest, ListReportSchedulesQuery, ListReportSchedulesResponse,
    ListRunsResponse, ReportSchedule, ReportScheduleResponse, RunRecord, TestSendRequest,
    UpdateReportScheduleRequest,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::DispatchError;

/// Header carrying the caller's identity, stored as `created_by`.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Default number of runs returned by the history endpoint.
const DEFAULT_RUNS_LIMIT: i64 = 50;

/// Query parameters for run history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<i64>,
}

/// Response for run-now and test-send.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RunResponse {
    pub schedule: ReportScheduleResponse,
    pub run: RunRecord,
}

fn created_by(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// An absent or empty body means "use the schedule's recipients".
fn parse_test_send(body: &[u8]) -> Result<TestSendRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(TestSendRequest::default());
    }
    let request: TestSendRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("Invalid request body: {}", e)))?;
    request.validate()?;
    Ok(request)
}

/// Run a send on its own task so the run is still recorded if the request
/// is dropped mid-send.
async fn detached<F>(send: F) -> Result<(ReportSchedule, RunRecord), ApiError>
where
    F: Future<Output = Result<(ReportSchedule, RunRecord), DispatchError>> + Send + 'static,
{
    tokio::spawn(send)
        .await
        .map_err(|e| ApiError::Internal(format!("Report send task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Create a new report schedule.
///
/// POST /api/v1/report-schedules
pub async fn create_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateReportScheduleRequest>,
) -> Result<(StatusCode, Json<ReportScheduleResponse>), ApiError> {
    let schedule = state
        .manager
        .create(request, created_by(&headers), Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(schedule.into())))
}

/// List report schedules.
///
/// GET /api/v1/report-schedules
pub async fn list_schedules(
    State(state): State<AppState>,
    Query(query): Query<ListReportSchedulesQuery>,
) -> Result<Json<ListReportSchedulesResponse>, ApiError> {
    let schedules = state.manager.list(&query).await?;
    let total = schedules.len() as i64;

    Ok(Json(ListReportSchedulesResponse {
        schedules: schedules.into_iter().map(Into::into).collect(),
        total,
    }))
}

/// Get a single report schedule.
///
/// GET /api/v1/report-schedules/:id
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportScheduleResponse>, ApiError> {
    let schedule = state.manager.get(id).await?;
    Ok(Json(schedule.into()))
}

/// Partially update a report schedule.
///
/// PUT /api/v1/report-schedules/:id
pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateReportScheduleRequest>,
) -> Result<Json<ReportScheduleResponse>, ApiError> {
    let schedule = state.manager.update(id, request, Utc::now()).await?;
    Ok(Json(schedule.into()))
}

/// Delete a report schedule and its run history.
///
/// DELETE /api/v1/report-schedules/:id
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.manager.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Flip a schedule between active and paused.
///
/// POST /api/v1/report-schedules/:id/toggle
pub async fn toggle_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportScheduleResponse>, ApiError> {
    let schedule = state.manager.toggle_active(id, Utc::now()).await?;
    Ok(Json(schedule.into()))
}

/// Send a diagnostic copy of the report.
///
/// POST /api/v1/report-schedules/:id/test
pub async fn test_send(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<RunResponse>, ApiError> {
    let request = parse_test_send(&body)?;
    let dispatcher = state.dispatcher.clone();
    let (schedule, run) = detached(async move {
        dispatcher
            .send_test(id, request.recipients, Utc::now())
            .await
    })
    .await?;

    info!(
        schedule_id = %id,
        run_id = %run.id,
        outcome = %run.outcome,
        "Test send completed"
    );

    Ok(Json(RunResponse {
        schedule: schedule.into(),
        run,
    }))
}

/// Generate and send the report immediately.
///
/// POST /api/v1/report-schedules/:id/run
pub async fn run_now(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunResponse>, ApiError> {
    let dispatcher = state.dispatcher.clone();
    let (schedule, run) = detached(async move { dispatcher.run_now(id, Utc::now()).await }).await?;

    info!(
        schedule_id = %id,
        run_id = %run.id,
        outcome = %run.outcome,
        "Run now completed"
    );

    Ok(Json(RunResponse {
        schedule: schedule.into(),
        run,
    }))
}

/// Run history for a schedule, newest first.
///
/// GET /api/v1/report-schedules/:id/runs
pub async fn list_runs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RunsQuery>,
) -> Result<Json<ListRunsResponse>, ApiError> {
    let runs = state
        .manager
        .runs(id, query.limit.unwrap_or(DEFAULT_RUNS_LIMIT))
        .await?;
    let total = runs.len() as i64;

    Ok(Json(ListRunsResponse { runs, total }))
}
