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
    pub overrides: OverrideBackendHealth,
    pub base_config: BaseConfigHealth,
}

/// Override backend status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct OverrideBackendHealth {
    pub backend: String,
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// Sizes of the cached base layers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BaseConfigHealth {
    pub adjustments: usize,
    pub flags: usize,
}

/// Simple status response for liveness/readiness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Full health check endpoint.
///
/// Reports override backend connectivity and the base layer sizes. An
/// unreachable backend only degrades the engine (reads fall back to base
/// config), so this stays 200 with status `degraded`.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let start = std::time::Instant::now();
    let connected = state.pricing.ping_overrides().await.is_ok();
    let latency_ms = start.elapsed().as_millis() as u64;

    let (adjustments, flags) = tokio::join!(
        state.pricing.base_adjustment_count(),
        state.flags.base_flag_count()
    );

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        overrides: OverrideBackendHealth {
            backend: state.pricing.backend_name().to_string(),
            connected,
            latency_ms: connected.then_some(latency_ms),
        },
        base_config: BaseConfigHealth { adjustments, flags },
    })
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
/// Returns 200 OK once the override backend answers.
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    match state.pricing.ping_overrides().await {
        Ok(()) => Ok(Json(StatusResponse {
            status: "ready".to_string(),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Override backend not ready");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            overrides: OverrideBackendHealth {
                backend: "redis".to_string(),
                connected: true,
                latency_ms: Some(2),
            },
            base_config: BaseConfigHealth {
                adjustments: 3,
                flags: 5,
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["overrides"]["backend"], "redis");
        assert_eq!(json["overrides"]["latency_ms"], 2);
        assert_eq!(json["base_config"]["flags"], 5);
    }

    #[test]
    fn test_override_backend_disconnected() {
        let health = OverrideBackendHealth {
            backend: "redis".to_string(),
            connected: false,
            latency_ms: None,
        };
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["connected"], false);
        assert!(json["latency_ms"].is_null());
    }

    #[test]
    fn test_status_response() {
        let response = StatusResponse {
            status: "alive".to_string(),
        };
        assert_eq!(response.status, "alive");
    }
}
