//! OpenAPI specification generation for the proxtrace API.

use axum::Json;
use proxtrace_core::{Sighting, TraceMode, TracePhase, TraceStatus};
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::identity::{IdentityResponse, UpdateSecretRequest};
use super::proximity::{DistanceRequest, DistanceResponse, SightingsResponse};
use super::trace::{StartTraceRequest, UpdatePausedRequest};

/// Serve the OpenAPI specification as JSON at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// The OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for proxtrace.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "proxtrace API",
        version = "0.1.0",
        description = r"
# proxtrace API

Local control surface for the proximity trace coordinator.

The coordinator advertises a service identifier derived from a shared secret
and scans for peers advertising the same identifier. Tracing only runs when a
secret is configured, the radio is present and powered, and tracing is not
paused. Start and stop are idempotent; inspect `started` in the returned
status to see whether a gate kept tracing stopped.
",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local proxtrace server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "trace", description = "Trace lifecycle: start, stop, pause and status"),
        (name = "identity", description = "Secret and derived identifiers"),
        (name = "proximity", description = "Distance estimation and observed peers")
    ),
    paths(
        super::health::health_check,
        super::trace::get_status,
        super::trace::start_trace,
        super::trace::stop_trace,
        super::trace::update_paused,
        super::identity::get_identity,
        super::identity::update_secret,
        super::proximity::estimate_distance,
        super::proximity::list_sightings,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            TraceStatus,
            TraceMode,
            TracePhase,
            StartTraceRequest,
            UpdatePausedRequest,
            IdentityResponse,
            UpdateSecretRequest,
            DistanceRequest,
            DistanceResponse,
            Sighting,
            SightingsResponse,
        )
    )
)]
pub struct ApiDoc;
