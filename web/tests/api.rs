//! Integration tests for the HTTP gateway.
//!
//! Drive the full router against the in-memory store and assert on status
//! codes, error codes, and response bodies.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use muster_core::{AttendanceCoordinator, CoordinatorPolicy, NotificationBus};
use muster_testing::{InMemoryEventStore, mocks::FixedClock};
use muster_web::{AppState, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
}

struct TestApp {
    router: Router,
    bus: Arc<NotificationBus>,
}

fn test_app() -> TestApp {
    let store = Arc::new(InMemoryEventStore::new());
    let coordinator = Arc::new(AttendanceCoordinator::with_clock(
        store,
        CoordinatorPolicy::default(),
        Arc::new(FixedClock::new(t0())),
    ));
    let bus = Arc::new(NotificationBus::new());
    TestApp {
        router: build_router(AppState::new(coordinator, bus.clone())),
        bus,
    }
}

fn event_payload(required: u32, start: DateTime<Utc>) -> Value {
    json!({
        "title": "Sandbag line",
        "description": "Assemble at the river bank",
        "lat": 31.0461,
        "lng": 34.8516,
        "address": "River bank access road",
        "start_time": start,
        "end_time": start + Duration::hours(4),
        "required_attendees": required,
    })
}

async fn send_json(router: &Router, method: &str, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(router, request).await
}

async fn send_get(router: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn create_event(app: &TestApp, required: u32) -> String {
    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/events",
        &event_payload(required, t0() + Duration::hours(1)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn confirm(app: &TestApp, event_id: &str, name: &str) -> (StatusCode, Value) {
    send_json(
        &app.router,
        "POST",
        &format!("/api/events/{event_id}/confirm"),
        &json!({"display_name": name}),
    )
    .await
}

// ============================================================================
// Creation and listing
// ============================================================================

#[tokio::test]
async fn create_returns_open_event_with_zero_participants() {
    let app = test_app();
    let (status, body) = send_json(
        &app.router,
        "POST",
        "/api/events",
        &event_payload(3, t0() + Duration::hours(1)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["lock_state"], "open");
    assert_eq!(body["participant_count"], 0);
    assert_eq!(body["required_attendees"], 3);
}

#[tokio::test]
async fn create_rejects_invalid_specs() {
    let app = test_app();

    let mut zero_required = event_payload(0, t0() + Duration::hours(1));
    zero_required["required_attendees"] = json!(0);
    let (status, body) = send_json(&app.router, "POST", "/api/events", &zero_required).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let mut backwards = event_payload(3, t0() + Duration::hours(1));
    backwards["end_time"] = json!(t0());
    let (status, _) = send_json(&app.router, "POST", "/api/events", &backwards).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn listing_splits_upcoming_and_historical() {
    let app = test_app();
    // Ended yesterday.
    let (status, _) = send_json(
        &app.router,
        "POST",
        "/api/events",
        &event_payload(2, t0() - Duration::days(1)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    // Starts in an hour.
    create_event(&app, 2).await;

    let (status, upcoming) = send_get(&app.router, "/api/events").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upcoming.as_array().unwrap().len(), 1);

    let (status, historical) = send_get(&app.router, "/api/events/historical").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(historical.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn get_event_embeds_participants() {
    let app = test_app();
    let id = create_event(&app, 3).await;
    confirm(&app, &id, "Dana").await;

    let (status, body) = send_get(&app.router, &format!("/api/events/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["participant_count"], 1);
    let participants = body["participants"].as_array().unwrap();
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0]["display_name"], "Dana");
}

#[tokio::test]
async fn unknown_event_returns_not_found() {
    let app = test_app();
    let missing = uuid::Uuid::new_v4();

    let (status, body) = send_get(&app.router, &format!("/api/events/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = confirm(&app, &missing.to_string(), "Dana").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Confirmation flow
// ============================================================================

#[tokio::test]
async fn threshold_locks_through_the_api() {
    let app = test_app();
    let id = create_event(&app, 2).await;

    let (status, body) = confirm(&app, &id, "a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["lock_state"], "open");

    let (status, body) = confirm(&app, &id, "b").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["lock_state"], "locked");
    assert_eq!(body["event"]["participant_count"], 2);
    assert_eq!(body["participant"]["display_name"], "b");

    // Past the threshold, further distinct identities are still accepted.
    let (status, body) = confirm(&app, &id, "c").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["participant_count"], 3);
    assert_eq!(body["event"]["lock_state"], "locked");
}

#[tokio::test]
async fn duplicate_confirmation_maps_to_conflict() {
    let app = test_app();
    let id = create_event(&app, 3).await;

    confirm(&app, &id, "Dana").await;
    let (status, body) = confirm(&app, &id, "Dana").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_PARTICIPANT");
}

#[tokio::test]
async fn half_specified_location_is_rejected() {
    let app = test_app();
    let id = create_event(&app, 3).await;

    for body in [
        json!({"display_name": "Dana", "lat": 32.08}),
        json!({"display_name": "Dana", "lng": 34.78}),
    ] {
        let (status, response) = send_json(
            &app.router,
            "POST",
            &format!("/api/events/{id}/confirm"),
            &body,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response["code"], "VALIDATION_ERROR");
    }

    // The rejected confirmations recorded nothing.
    let (_, detail) = send_get(&app.router, &format!("/api/events/{id}")).await;
    assert_eq!(detail["participant_count"], 0);
}

#[tokio::test]
async fn confirmation_accepts_optional_location() {
    let app = test_app();
    let id = create_event(&app, 3).await;

    let (status, body) = send_json(
        &app.router,
        "POST",
        &format!("/api/events/{id}/confirm"),
        &json!({"display_name": "Dana", "lat": 32.08, "lng": 34.78}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["participant"]["lat"], 32.08);
    assert_eq!(body["participant"]["lng"], 34.78);
}

// ============================================================================
// Threshold revision and editing
// ============================================================================

#[tokio::test]
async fn lowering_required_locks_event() {
    let app = test_app();
    let id = create_event(&app, 3).await;
    confirm(&app, &id, "a").await;

    let (status, body) = send_json(
        &app.router,
        "PUT",
        &format!("/api/events/{id}/required"),
        &json!({"required_attendees": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lock_state"], "locked");
    assert_eq!(body["required_attendees"], 1);
}

#[tokio::test]
async fn zero_required_is_rejected() {
    let app = test_app();
    let id = create_event(&app, 3).await;

    let (status, body) = send_json(
        &app.router,
        "PUT",
        &format!("/api/events/{id}/required"),
        &json!({"required_attendees": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn edit_is_rejected_once_locked() {
    let app = test_app();
    let id = create_event(&app, 1).await;

    let (status, body) = send_json(
        &app.router,
        "PATCH",
        &format!("/api/events/{id}"),
        &json!({"title": "Sandbag line (north)"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Sandbag line (north)");

    confirm(&app, &id, "a").await;

    let (status, body) = send_json(
        &app.router,
        "PATCH",
        &format!("/api/events/{id}"),
        &json!({"title": "Should not apply"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "EDIT_LOCKED");

    let (_, current) = send_get(&app.router, &format!("/api/events/{id}")).await;
    assert_eq!(current["title"], "Sandbag line (north)");
}

// ============================================================================
// Notifications and health
// ============================================================================

#[tokio::test]
async fn mutations_broadcast_to_subscribers() {
    let app = test_app();
    let mut handle = app.bus.subscribe();
    // Connection ack arrives first.
    let ack = handle.receiver.recv().await.unwrap();
    assert!(matches!(ack, muster_core::Notification::Connected { .. }));

    let id = create_event(&app, 2).await;
    let created = handle.receiver.recv().await.unwrap();
    assert!(matches!(
        created,
        muster_core::Notification::EventCreated { .. }
    ));

    confirm(&app, &id, "Dana").await;
    let confirmed = handle.receiver.recv().await.unwrap();
    match confirmed {
        muster_core::Notification::AttendanceConfirmed {
            display_name,
            participant_count,
            ..
        } => {
            assert_eq!(display_name, "Dana");
            assert_eq!(participant_count, 1);
        }
        other => panic!("unexpected notification: {other:?}"),
    }
}

#[tokio::test]
async fn cross_origin_requests_are_allowed() {
    let app = test_app();
    let request = Request::builder()
        .method("GET")
        .uri("/api/events")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
    );
}

#[tokio::test]
async fn health_and_readiness_respond() {
    let app = test_app();

    let (status, body) = send_get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send_get(&app.router, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}
