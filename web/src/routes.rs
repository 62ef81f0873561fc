//! Router configuration.
//!
//! Builds the complete Axum router with all endpoints.

use crate::handlers::health::{health_check, readiness_check};
use crate::handlers::{events, websocket};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, patch, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the complete Axum router.
///
/// Configures all routes:
/// - Health checks
/// - Event coordination endpoints
/// - WebSocket live updates
///
/// # Arguments
///
/// - `state`: Application state to share with handlers
///
/// # Returns
///
/// Configured Axum router ready to serve requests.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Event coordination
        .route("/events", post(events::create_event))
        .route("/events", get(events::list_events))
        .route("/events/historical", get(events::list_historical_events))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id", patch(events::edit_event))
        .route("/events/:id/confirm", post(events::confirm_attendance))
        .route(
            "/events/:id/required",
            put(events::update_required_attendees),
        )
        // Live updates
        .route("/ws", get(websocket::handle));

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // API routes under /api prefix
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        // The frontend is served separately, so cross-origin calls are the
        // normal case.
        .layer(CorsLayer::permissive())
        .with_state(state)
}
