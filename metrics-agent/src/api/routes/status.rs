//! Engine status routes.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{PluginsResponse, SchedulesResponse};
use crate::api::server::AppState;
use crate::engine::{Engine, StatusSnapshot};

/// Create the status router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_status))
        .route("/schedules", get(list_schedules))
        .route("/plugins", get(list_plugins))
}

fn engine(state: &AppState) -> ApiResult<&Engine> {
    state
        .engine
        .as_deref()
        .ok_or_else(ApiError::engine_unavailable)
}

/// Verdict, uptime, counts and every source, sink and schedule.
async fn get_status(State(state): State<AppState>) -> ApiResult<Json<StatusSnapshot>> {
    let engine = engine(&state)?;
    Ok(Json(engine.snapshot().await))
}

async fn list_schedules(State(state): State<AppState>) -> ApiResult<Json<SchedulesResponse>> {
    let schedules = engine(&state)?.schedule_statuses();
    Ok(Json(SchedulesResponse {
        total: schedules.len(),
        schedules,
    }))
}

async fn list_plugins(State(state): State<AppState>) -> ApiResult<Json<PluginsResponse>> {
    let engine = engine(&state)?;
    let (sources, sinks) = futures::join!(engine.source_statuses(), engine.sink_statuses());
    Ok(Json(PluginsResponse { sources, sinks }))
}
