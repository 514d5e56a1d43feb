//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::models::{ComponentHealth, HealthResponse};
use crate::api::server::AppState;
use crate::engine::HealthStatus;

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

/// Health check endpoint.
///
/// HTTP 200 for healthy and degraded, 503 for unhealthy or when no engine
/// is wired.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.uptime_secs();

    let Some(engine) = &state.engine else {
        let response = HealthResponse {
            status: HealthStatus::Unhealthy.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime,
            components: vec![],
        };
        return (StatusCode::SERVICE_UNAVAILABLE, Json(response));
    };

    let report = engine.health().await;
    let response = HealthResponse {
        status: report.status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
        components: report.components().map(ComponentHealth::from).collect(),
    };

    (status_code(report.status), Json(response))
}

/// Readiness check - is the agent delivering data somewhere?
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let ready = match &state.engine {
        Some(engine) => engine.health_status().await.is_ready(),
        None => false,
    };
    if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Liveness check - is the process responsive?
async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "uptime_secs": state.uptime_secs()
        })),
    )
}

fn status_code(status: HealthStatus) -> StatusCode {
    if status.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
