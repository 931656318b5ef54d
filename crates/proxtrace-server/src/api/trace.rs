//! Trace lifecycle endpoints.
//!
//! Every mutating endpoint answers with the coordinator status after the
//! transition, so callers can see when a gate kept tracing stopped.

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use proxtrace_core::{TraceMode, TraceStatus};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Start request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "background": true }))]
pub struct StartTraceRequest {
    /// Use the background timing profile. Defaults to foreground.
    #[serde(default)]
    #[schema(example = true)]
    pub background: bool,
}

/// Paused flag update.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "paused": true }))]
pub struct UpdatePausedRequest {
    /// New value of the persisted paused flag.
    #[schema(example = true)]
    pub paused: bool,
}

/// Creates the trace router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/start", post(start_trace))
        .route("/stop", post(stop_trace))
        .route("/paused", put(update_paused))
}

/// Current coordinator status.
#[utoipa::path(
    get,
    path = "/api/trace/status",
    tag = "trace",
    operation_id = "getTraceStatus",
    summary = "Get trace status",
    description = "Returns the lifecycle phase, the gates and the device id. \
        Has no side effects on the radio.",
    responses(
        (status = 200, description = "Current status", body = TraceStatus),
        (status = 500, description = "Settings could not be read")
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> ApiResult<Json<TraceStatus>> {
    Ok(Json(state.coordinator.status()?))
}

/// Start tracing.
#[utoipa::path(
    post,
    path = "/api/trace/start",
    tag = "trace",
    operation_id = "startTrace",
    summary = "Start tracing",
    description = "Stops any running trace and starts in the requested mode. \
        Tracing stays stopped when paused, without an identity, or when the \
        radio is unavailable; check `started` in the response.",
    request_body = StartTraceRequest,
    responses(
        (status = 200, description = "Status after the start attempt", body = TraceStatus),
        (status = 500, description = "Settings could not be read")
    )
)]
pub async fn start_trace(
    State(state): State<SharedState>,
    Json(request): Json<StartTraceRequest>,
) -> ApiResult<Json<TraceStatus>> {
    let mode = TraceMode::from_background(request.background);
    info!(%mode, "Start requested");
    state.coordinator.start(mode)?;
    Ok(Json(state.coordinator.status()?))
}

/// Stop tracing.
#[utoipa::path(
    post,
    path = "/api/trace/stop",
    tag = "trace",
    operation_id = "stopTrace",
    summary = "Stop tracing",
    responses(
        (status = 200, description = "Status after stopping", body = TraceStatus),
        (status = 500, description = "Settings could not be read")
    )
)]
pub async fn stop_trace(State(state): State<SharedState>) -> ApiResult<Json<TraceStatus>> {
    info!("Stop requested");
    state.coordinator.stop();
    Ok(Json(state.coordinator.status()?))
}

/// Pause or resume tracing.
#[utoipa::path(
    put,
    path = "/api/trace/paused",
    tag = "trace",
    operation_id = "updatePaused",
    summary = "Pause or resume tracing",
    description = "Persists the paused flag. Pausing stops tracing; resuming \
        starts again in the last mode.",
    request_body = UpdatePausedRequest,
    responses(
        (status = 200, description = "Status after the change", body = TraceStatus),
        (status = 500, description = "Settings could not be written")
    )
)]
pub async fn update_paused(
    State(state): State<SharedState>,
    Json(request): Json<UpdatePausedRequest>,
) -> ApiResult<Json<TraceStatus>> {
    state.coordinator.set_paused(request.paused)?;
    Ok(Json(state.coordinator.status()?))
}
