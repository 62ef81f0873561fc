//! Health check endpoints.
//!
//! Provides endpoints for monitoring service health and readiness.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use muster_core::EventFilter;
use serde::Serialize;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Health check endpoint.
///
/// Returns 200 OK if the service is running. This is a simple liveness
/// check - it doesn't verify dependencies.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"ok","version":"0.1.0"}
/// ```
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Store connectivity
    pub store: bool,
    /// Live WebSocket subscriptions
    pub subscribers: usize,
}

/// Readiness check endpoint.
///
/// Returns 200 OK once the store answers queries; 503 otherwise. Used by
/// orchestration readiness probes to gate traffic.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let store_ok = state
        .coordinator
        .list_events(EventFilter::Upcoming)
        .await
        .is_ok();

    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            ready: store_ok,
            store: store_ok,
            subscribers: state.bus.subscriber_count(),
        }),
    )
}
