//! Identity endpoints.
//!
//! The secret itself is never returned; only whether one is set and the
//! identifiers derived from it.

use axum::extract::State;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Identity response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "configured": true,
    "device_id": "6f1c2a64-9a54-5c52-8d9e-1b1f7c3b2e10",
    "service_id": "0b5e7a41-3d2c-5f8e-a1b4-7c6d9e0f1a2b"
}))]
pub struct IdentityResponse {
    /// Whether a secret is configured.
    #[schema(example = true)]
    pub configured: bool,

    /// Identifier other devices learn about us.
    pub device_id: Option<Uuid>,

    /// Radio service identifier shared by every device with the same secret.
    pub service_id: Option<Uuid>,
}

/// Secret update. `null` clears the secret.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "secret": "household-7f3a" }))]
pub struct UpdateSecretRequest {
    /// New secret, or `null` to clear it.
    #[schema(nullable)]
    pub secret: Option<String>,
}

/// Creates the identity router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_identity))
        .route("/secret", put(update_secret))
}

fn identity_response(state: &SharedState) -> IdentityResponse {
    let device_id = state.coordinator.device_id();
    IdentityResponse {
        configured: device_id.is_some(),
        device_id,
        service_id: state.coordinator.service_id().ok(),
    }
}

/// Current identity.
#[utoipa::path(
    get,
    path = "/api/identity",
    tag = "identity",
    operation_id = "getIdentity",
    summary = "Get the derived identifiers",
    responses(
        (status = 200, description = "Current identity", body = IdentityResponse)
    )
)]
pub async fn get_identity(State(state): State<SharedState>) -> Json<IdentityResponse> {
    Json(identity_response(&state))
}

/// Replace or clear the secret.
#[utoipa::path(
    put,
    path = "/api/identity/secret",
    tag = "identity",
    operation_id = "updateSecret",
    summary = "Replace or clear the identity secret",
    description = "Clearing stops tracing and releases the radio session. \
        A new secret re-scopes the session to the new identifiers; tracing \
        must be started again afterwards.",
    request_body = UpdateSecretRequest,
    responses(
        (status = 200, description = "Identity after the change", body = IdentityResponse),
        (status = 400, description = "Empty secret", body = super::error::ErrorResponse),
        (status = 500, description = "Settings could not be written")
    )
)]
pub async fn update_secret(
    State(state): State<SharedState>,
    Json(request): Json<UpdateSecretRequest>,
) -> ApiResult<Json<IdentityResponse>> {
    let secret = request.secret.as_deref();
    if secret.is_some_and(|s| s.trim().is_empty()) {
        return Err(ApiError::bad_request(
            "empty_secret",
            "Secret must not be empty; send null to clear it",
        ));
    }

    state.coordinator.set_secret(secret)?;
    info!(configured = secret.is_some(), "Secret updated");
    Ok(Json(identity_response(&state)))
}
