//! HTTP API routes and handlers.
//!
//! - `trace` - Start, stop, pause and status
//! - `identity` - Secret and derived identifiers
//! - `proximity` - Distance estimation and sightings
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod identity;
pub mod openapi;
pub mod proximity;
pub mod trace;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /api
/// ├── /trace             - Status, start, stop, paused
/// ├── /identity          - Derived identifiers, secret
/// ├── /distance          - Distance estimate
/// ├── /sightings         - Observed peers
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .nest("/trace", trace::router())
                .nest("/identity", identity::router())
                .route("/distance", post(proximity::estimate_distance))
                .route("/sightings", get(proximity::list_sightings))
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use chrono::Utc;
    use proxtrace_core::{
        derive_device_id, derive_service_id, DeviceStore, FileSettingsStore, MemorySettingsStore,
        MockRadio, Sighting, TraceConfig, TraceMode,
    };
    use serde_json::{json, Value};

    use super::*;
    use crate::state::AppState;

    fn server_with(settings: MemorySettingsStore) -> (TestServer, SharedState, Arc<MockRadio>) {
        let (state, radio) =
            AppState::simulated(&TraceConfig::default(), Arc::new(settings)).unwrap();
        let server = TestServer::new(create_router(state.clone())).unwrap();
        (server, state, radio)
    }

    fn server() -> (TestServer, SharedState, Arc<MockRadio>) {
        server_with(MemorySettingsStore::with_secret("household-7f3a"))
    }

    #[tokio::test]
    async fn test_health() {
        let (server, _, _) = server();

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["started"], false);
    }

    #[tokio::test]
    async fn test_status_does_not_touch_radio() {
        let (server, _, radio) = server();

        let response = server.get("/api/trace/status").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["phase"], "stopped");
        assert_eq!(body["initialized"], false);
        assert!(radio.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_background_then_stop() {
        let (server, state, radio) = server();

        let response = server
            .post("/api/trace/start")
            .json(&json!({ "background": true }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["started"], true);
        assert_eq!(body["phase"], "active_background");
        assert_eq!(body["background"], true);
        assert_eq!(radio.observing().len(), 1);

        let response = server.post("/api/trace/stop").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["started"], false);
        assert!(radio.observing().is_empty());
        assert!(radio.broadcasting().is_empty());
        assert!(!state.coordinator.is_started());
    }

    #[tokio::test]
    async fn test_start_defaults_to_foreground() {
        let (server, _, _) = server();

        let response = server.post("/api/trace/start").json(&json!({})).await;
        let body: Value = response.json();
        assert_eq!(body["phase"], "active_foreground");
        assert_eq!(body["background"], false);
    }

    #[tokio::test]
    async fn test_start_without_secret_stays_stopped() {
        let (server, _, radio) = server_with(MemorySettingsStore::new());

        let response = server
            .post("/api/trace/start")
            .json(&json!({ "background": true }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["started"], false);
        assert!(radio.session().is_none());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (server, state, _) = server();
        state.coordinator.start(TraceMode::Background).unwrap();

        let response = server
            .put("/api/trace/paused")
            .json(&json!({ "paused": true }))
            .await;
        let body: Value = response.json();
        assert_eq!(body["paused"], true);
        assert_eq!(body["started"], false);

        let response = server
            .put("/api/trace/paused")
            .json(&json!({ "paused": false }))
            .await;
        let body: Value = response.json();
        assert_eq!(body["paused"], false);
        assert_eq!(body["phase"], "active_background");
    }

    #[tokio::test]
    async fn test_identity_lifecycle() {
        let (server, _, radio) = server_with(MemorySettingsStore::new());

        let body: Value = server.get("/api/identity").await.json();
        assert_eq!(body["configured"], false);
        assert!(body["device_id"].is_null());

        let response = server
            .put("/api/identity/secret")
            .json(&json!({ "secret": "household-7f3a" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["configured"], true);
        assert_ne!(body["device_id"], body["service_id"]);
        assert!(radio.session().is_some());

        let body: Value = server
            .put("/api/identity/secret")
            .json(&json!({ "secret": null }))
            .await
            .json();
        assert_eq!(body["configured"], false);
        assert!(radio.session().is_none());
    }

    #[tokio::test]
    async fn test_empty_secret_rejected() {
        let (server, state, _) = server();

        let response = server
            .put("/api/identity/secret")
            .json(&json!({ "secret": "  " }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "empty_secret");
        assert!(state.coordinator.device_id().is_some());
    }

    #[tokio::test]
    async fn test_secret_is_stored_verbatim() {
        let (server, state, _) = server_with(MemorySettingsStore::new());

        let body: Value = server
            .put("/api/identity/secret")
            .json(&json!({ "secret": " device-42 " }))
            .await
            .json();

        assert_eq!(
            body["device_id"],
            json!(derive_device_id(" device-42 ").to_string())
        );
        assert_eq!(
            body["service_id"],
            json!(derive_service_id(" device-42 ").to_string())
        );
        assert_ne!(body["device_id"], json!(derive_device_id("device-42").to_string()));
        assert_eq!(
            state.coordinator.secret().unwrap().as_deref(),
            Some(" device-42 ")
        );
    }

    #[tokio::test]
    async fn test_unwritable_settings_is_internal_error() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let settings = FileSettingsStore::new(&blocker.path().join("data"));
        let (state, _) = AppState::simulated(&TraceConfig::default(), Arc::new(settings)).unwrap();
        let server = TestServer::new(create_router(state)).unwrap();

        let response = server
            .put("/api/trace/paused")
            .json(&json!({ "paused": true }))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert_eq!(body["error"], "persistence_error");
    }

    #[tokio::test]
    async fn test_distance() {
        let (server, _, _) = server();

        let body: Value = server
            .post("/api/distance")
            .json(&json!({ "rssi_dbm": -59, "reference_power_dbm": 59 }))
            .await
            .json();
        let distance = body["distance_cm"].as_f64().unwrap();
        assert!((distance - 100.0).abs() < 1e-9);

        let body: Value = server
            .post("/api/distance")
            .json(&json!({ "rssi_dbm": -70, "reference_power_dbm": -1 }))
            .await
            .json();
        assert!(body["distance_cm"].is_null());
    }

    #[tokio::test]
    async fn test_sightings_newest_first() {
        let (server, state, _) = server();
        for (address, rssi) in [("AA:AA:AA:AA:AA:01", -70), ("AA:AA:AA:AA:AA:02", -55)] {
            state.sightings.record(Sighting {
                address: address.to_string(),
                rssi_dbm: rssi,
                reference_power_dbm: -1,
                distance_cm: None,
                seen_at_utc: Utc::now(),
            });
        }

        let body: Value = server.get("/api/sightings?limit=1").await.json();
        assert_eq!(body["total"], 2);
        let sightings = body["sightings"].as_array().unwrap();
        assert_eq!(sightings.len(), 1);
        assert_eq!(sightings[0]["address"], "AA:AA:AA:AA:AA:02");
    }

    #[tokio::test]
    async fn test_openapi_served() {
        let (server, _, _) = server();

        let response = server.get("/api/openapi.json").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["info"]["title"], "proxtrace API");
    }
}
