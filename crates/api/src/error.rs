use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::services::{describe_validation_errors, ScheduleError};
use serde::Serialize;
use thiserror::Error;

use crate::services::dispatcher::DispatchError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::Validation(msg) => ApiError::Validation(msg),
            ScheduleError::NotFound(id) => {
                ApiError::NotFound(format!("Report schedule {} not found", id))
            }
            ScheduleError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NotFound(id) => {
                ApiError::NotFound(format!("Report schedule {} not found", id))
            }
            DispatchError::InvalidRequest(msg) => ApiError::Validation(msg),
            DispatchError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(describe_validation_errors(&errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::services::StoreError;
    use uuid::Uuid;

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::NotFound("x".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Validation("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("x".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::ServiceUnavailable("x".into())
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(
            format!("{}", ApiError::NotFound("test".to_string())),
            "Not found: test"
        );
        assert_eq!(
            format!("{}", ApiError::Validation("test".to_string())),
            "Validation error: test"
        );
    }

    #[test]
    fn test_from_schedule_error() {
        let id = Uuid::new_v4();
        assert!(matches!(
            ApiError::from(ScheduleError::NotFound(id)),
            ApiError::NotFound(msg) if msg.contains(&id.to_string())
        ));
        assert!(matches!(
            ApiError::from(ScheduleError::Validation("bad day".into())),
            ApiError::Validation(msg) if msg == "bad day"
        ));
        assert!(matches!(
            ApiError::from(ScheduleError::Store(StoreError::Database("down".into()))),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn test_from_dispatch_error() {
        let id = Uuid::new_v4();
        assert!(matches!(
            ApiError::from(DispatchError::NotFound(id)),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(DispatchError::InvalidRequest("no recipients".into())),
            ApiError::Validation(_)
        ));
    }
}
