//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::app::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage: StorageHealth,
    pub dispatcher_enabled: bool,
}

/// Storage backend health status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageHealth {
    pub backend: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Simple status response for liveness/readiness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Probe the storage backend. The memory backend is always reachable.
async fn check_storage(state: &AppState) -> StorageHealth {
    match &state.pool {
        Some(pool) => {
            let latency = persistence::db::ping(pool).await.ok();
            StorageHealth {
                backend: "postgres".to_string(),
                connected: latency.is_some(),
                latency_ms: latency.map(|d| d.as_millis() as u64),
            }
        }
        None => StorageHealth {
            backend: "memory".to_string(),
            connected: true,
            latency_ms: None,
        },
    }
}

/// Full health check endpoint.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let storage = check_storage(&state).await;
    if !storage.connected {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage,
        dispatcher_enabled: state.config.dispatcher.enabled,
    }))
}

/// Liveness probe endpoint.
///
/// Returns 200 OK if the process is running.
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 OK if the service can accept traffic (storage reachable).
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    if check_storage(&state).await.connected {
        Ok(Json(StatusResponse {
            status: "ready".to_string(),
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.3.0".to_string(),
            storage: StorageHealth {
                backend: "memory".to_string(),
                connected: true,
                latency_ms: None,
            },
            dispatcher_enabled: false,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"backend\":\"memory\""));
        assert!(json.contains("\"dispatcher_enabled\":false"));
        assert!(!json.contains("latency_ms"));
    }

    #[test]
    fn test_status_response() {
        let response = StatusResponse {
            status: "alive".to_string(),
        };
        assert_eq!(response.status, "alive");
    }
}
