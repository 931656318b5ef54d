//! Distance estimation and recorded sightings.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use proxtrace_core::Sighting;

use crate::state::SharedState;

/// Default number of sightings returned.
const DEFAULT_SIGHTING_LIMIT: usize = 50;

/// Distance request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "rssi_dbm": -60, "reference_power_dbm": -69 }))]
pub struct DistanceRequest {
    /// Received signal strength in dBm.
    #[schema(example = -60)]
    pub rssi_dbm: i16,

    /// Advertised reference power in dBm. `-1` means unknown.
    #[schema(example = -69)]
    pub reference_power_dbm: i16,
}

/// Distance response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DistanceResponse {
    /// Estimated distance in centimetres, `null` when the reference power is unknown.
    pub distance_cm: Option<f64>,

    /// Path-loss exponent used for the estimate.
    #[schema(example = 2.0)]
    pub environmental_factor: f64,
}

/// Query parameters for the sightings list.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SightingsQuery {
    /// Maximum number of sightings to return.
    pub limit: Option<usize>,
}

/// Recorded sightings, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SightingsResponse {
    /// Sightings, newest first.
    pub sightings: Vec<Sighting>,

    /// Total sightings held in memory.
    pub total: usize,
}

/// Estimate distance from a signal reading.
#[utoipa::path(
    post,
    path = "/api/distance",
    tag = "proximity",
    operation_id = "estimateDistance",
    summary = "Estimate distance from RSSI",
    description = "Applies the log-distance path-loss model with the configured \
        environmental factor. The result is in centimetres and is not clamped.",
    request_body = DistanceRequest,
    responses(
        (status = 200, description = "Estimate", body = DistanceResponse)
    )
)]
pub async fn estimate_distance(
    State(state): State<SharedState>,
    Json(request): Json<DistanceRequest>,
) -> Json<DistanceResponse> {
    let estimator = state.coordinator.estimator();
    Json(DistanceResponse {
        distance_cm: estimator.estimate(request.rssi_dbm, request.reference_power_dbm),
        environmental_factor: estimator.environmental_factor(),
    })
}

/// List recorded sightings.
#[utoipa::path(
    get,
    path = "/api/sightings",
    tag = "proximity",
    operation_id = "listSightings",
    summary = "List recent sightings",
    params(SightingsQuery),
    responses(
        (status = 200, description = "Recent sightings", body = SightingsResponse)
    )
)]
pub async fn list_sightings(
    State(state): State<SharedState>,
    Query(query): Query<SightingsQuery>,
) -> Json<SightingsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_SIGHTING_LIMIT);
    Json(SightingsResponse {
        sightings: state.sightings.recent(limit),
        total: state.sightings.len(),
    })
}
