//! Event coordination API endpoints.
//!
//! - POST /api/events - Open a new event
//! - GET /api/events - List upcoming events
//! - GET /api/events/historical - List ended events
//! - GET /api/events/:id - Event details with participants
//! - POST /api/events/:id/confirm - Confirm attendance
//! - PUT /api/events/:id/required - Revise the attendee threshold
//! - PATCH /api/events/:id - Edit event details
//!
//! Every successful mutation is followed by a broadcast on the notification
//! bus, enqueued after the coordinator has committed.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use muster_core::{
    Event, EventFilter, EventId, EventPatch, EventSpec, GeoPoint, Identity, LockState,
    Notification, Participant,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to open a new event.
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    /// Event title
    pub title: String,
    /// Event description
    pub description: String,
    /// Latitude of the event location
    pub lat: f64,
    /// Longitude of the event location
    pub lng: f64,
    /// Pre-resolved address, if available
    pub address: Option<String>,
    /// Scheduled window start
    pub start_time: DateTime<Utc>,
    /// Scheduled window end
    pub end_time: DateTime<Utc>,
    /// Attendee threshold that locks the event once reached
    pub required_attendees: u32,
}

/// Request to confirm attendance.
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    /// Responder display name
    pub display_name: String,
    /// Stable identity key for authenticated flows
    pub user_key: Option<String>,
    /// Responder latitude, if shared
    pub lat: Option<f64>,
    /// Responder longitude, if shared
    pub lng: Option<f64>,
}

/// Request to revise the attendee threshold.
#[derive(Debug, Deserialize)]
pub struct UpdateRequiredRequest {
    /// New threshold, must be at least 1
    pub required_attendees: u32,
}

/// Partial edit of event details.
#[derive(Debug, Deserialize)]
pub struct PatchEventRequest {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New window start
    pub start_time: Option<DateTime<Utc>>,
    /// New window end
    pub end_time: Option<DateTime<Utc>>,
}

/// Participant record in responses.
#[derive(Debug, Serialize)]
pub struct ParticipantResponse {
    /// Participant record ID
    pub id: Uuid,
    /// Responder display name
    pub display_name: String,
    /// Responder latitude, if shared
    pub lat: Option<f64>,
    /// Responder longitude, if shared
    pub lng: Option<f64>,
    /// Confirmation timestamp
    pub confirmed_at: DateTime<Utc>,
}

impl From<Participant> for ParticipantResponse {
    fn from(p: Participant) -> Self {
        Self {
            id: *p.id.as_uuid(),
            display_name: p.identity.display_name,
            lat: p.location.map(|l| l.lat),
            lng: p.location.map(|l| l.lng),
            confirmed_at: p.confirmed_at,
        }
    }
}

/// Event summary in responses.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    /// Event ID
    pub id: Uuid,
    /// Event title
    pub title: String,
    /// Event description
    pub description: String,
    /// Latitude of the event location
    pub lat: f64,
    /// Longitude of the event location
    pub lng: f64,
    /// Pre-resolved address, if available
    pub address: Option<String>,
    /// Scheduled window start
    pub start_time: DateTime<Utc>,
    /// Scheduled window end
    pub end_time: DateTime<Utc>,
    /// Attendee threshold
    pub required_attendees: u32,
    /// Derived Open/Locked state
    pub lock_state: LockState,
    /// Number of recorded confirmations
    pub participant_count: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<Event> for EventResponse {
    fn from(e: Event) -> Self {
        Self {
            id: *e.id.as_uuid(),
            title: e.title,
            description: e.description,
            lat: e.location.lat,
            lng: e.location.lng,
            address: e.address,
            start_time: e.start_time,
            end_time: e.end_time,
            required_attendees: e.required_attendees,
            lock_state: e.lock_state,
            participant_count: e.participant_count,
            created_at: e.created_at,
        }
    }
}

/// Event details with the participant list embedded.
#[derive(Debug, Serialize)]
pub struct EventDetailResponse {
    /// Event summary
    #[serde(flatten)]
    pub event: EventResponse,
    /// Recorded confirmations, oldest first
    pub participants: Vec<ParticipantResponse>,
}

/// Response for a successful confirmation.
#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    /// The event after the confirmation, lock state recomputed
    pub event: EventResponse,
    /// The newly recorded participant
    pub participant: ParticipantResponse,
}

// ============================================================================
// Handlers
// ============================================================================

/// Open a new event.
///
/// # Errors
///
/// Returns 422 when the spec is invalid (threshold below 1, window not
/// forward, field bounds violated).
pub async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let spec = EventSpec {
        title: request.title,
        description: request.description,
        location: GeoPoint {
            lat: request.lat,
            lng: request.lng,
        },
        address: request.address,
        start_time: request.start_time,
        end_time: request.end_time,
        required_attendees: request.required_attendees,
    };

    let event = state.coordinator.create_event(spec).await?;
    state.publish(Notification::event_created(&event));
    Ok((StatusCode::CREATED, Json(event.into())))
}

/// List events whose window has not yet ended, soonest first.
///
/// # Errors
///
/// Returns 500 on store failure.
pub async fn list_events(
    State(state): State<AppState>,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let events = state.coordinator.list_events(EventFilter::Upcoming).await?;
    Ok(Json(events.into_iter().map(Into::into).collect()))
}

/// List events whose window has ended, most recent first.
///
/// # Errors
///
/// Returns 500 on store failure.
pub async fn list_historical_events(
    State(state): State<AppState>,
) -> Result<Json<Vec<EventResponse>>, AppError> {
    let events = state
        .coordinator
        .list_events(EventFilter::Historical)
        .await?;
    Ok(Json(events.into_iter().map(Into::into).collect()))
}

/// Event details with the participant list embedded.
///
/// # Errors
///
/// Returns 404 when the event does not exist.
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EventDetailResponse>, AppError> {
    let event_id = EventId::from_uuid(id);
    let (event, participants) = state.coordinator.event_details(event_id).await?;
    Ok(Json(EventDetailResponse {
        event: event.into(),
        participants: participants.into_iter().map(Into::into).collect(),
    }))
}

/// Confirm attendance for an event.
///
/// # Errors
///
/// Returns 404 for an unknown event, 409 for a duplicate confirmation or
/// when the join policy forbids new confirmations, 422 for an invalid
/// display name or a half-specified location.
pub async fn confirm_attendance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let event_id = EventId::from_uuid(id);
    let identity = Identity {
        display_name: request.display_name,
        user_key: request.user_key,
    };
    let location = match (request.lat, request.lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        (None, None) => None,
        _ => {
            return Err(AppError::validation(
                "lat and lng must be provided together",
            ));
        }
    };

    let outcome = state
        .coordinator
        .confirm_attendance(event_id, identity, location)
        .await?;

    state.publish(Notification::attendance_confirmed(
        &outcome.event,
        &outcome.participant,
    ));
    Ok(Json(ConfirmResponse {
        event: outcome.event.into(),
        participant: outcome.participant.into(),
    }))
}

/// Revise the required-attendee threshold.
///
/// May flip the lock state in either direction.
///
/// # Errors
///
/// Returns 404 for an unknown event, 422 for a threshold below 1.
pub async fn update_required_attendees(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRequiredRequest>,
) -> Result<Json<EventResponse>, AppError> {
    let event_id = EventId::from_uuid(id);
    let event = state
        .coordinator
        .update_required_attendees(event_id, request.required_attendees)
        .await?;

    state.publish(Notification::requirement_updated(&event));
    Ok(Json(event.into()))
}

/// Edit event details (title, description, time window).
///
/// # Errors
///
/// Returns 404 for an unknown event, 409 when the edit-permission predicate
/// is false for the current lock state, 422 for invalid patched fields.
pub async fn edit_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PatchEventRequest>,
) -> Result<Json<EventResponse>, AppError> {
    let event_id = EventId::from_uuid(id);
    let patch = EventPatch {
        title: request.title,
        description: request.description,
        start_time: request.start_time,
        end_time: request.end_time,
    };

    let event = state.coordinator.edit_event_details(event_id, patch).await?;

    state.publish(Notification::event_edited(&event));
    Ok(Json(event.into()))
}
