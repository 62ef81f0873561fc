//! Domain types for attendance coordination.
//!
//! This module contains the identifiers, entities, and value objects shared
//! by the coordinator, the store contract, and the notification bus.

use crate::policy::LockState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a participant record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Creates a new random `ParticipantId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ParticipantId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a notification subscriber
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Creates a new random `SubscriberId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value objects
// ============================================================================

/// A geographic point (WGS84).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
}

/// Responder identity for a confirmation.
///
/// Unauthenticated flows are permitted, so the display name doubles as the
/// identity key when no stable key is supplied. The uniqueness invariant
/// (at most one participant per event and identity) is enforced on
/// [`Identity::key`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Human-readable name shown to other responders
    pub display_name: String,
    /// Stable identity key; `None` means the display name is the key
    pub user_key: Option<String>,
}

impl Identity {
    /// Identity from a display name alone (unauthenticated flow).
    #[must_use]
    pub const fn anonymous(display_name: String) -> Self {
        Self {
            display_name,
            user_key: None,
        }
    }

    /// The key the duplicate-confirmation invariant is enforced on.
    #[must_use]
    pub fn key(&self) -> &str {
        self.user_key.as_deref().unwrap_or(&self.display_name)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A coordinated response opportunity with a capacity threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    pub id: EventId,
    /// Event title
    pub title: String,
    /// Event description
    pub description: String,
    /// Event location
    pub location: GeoPoint,
    /// Pre-resolved address, when one was supplied
    pub address: Option<String>,
    /// Scheduled window start
    pub start_time: DateTime<Utc>,
    /// Scheduled window end
    pub end_time: DateTime<Utc>,
    /// Capacity threshold driving the lock-state transition
    pub required_attendees: u32,
    /// Derived Open/Locked flag
    pub lock_state: LockState,
    /// Number of recorded confirmations
    pub participant_count: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A recorded confirmation of attendance by one identity for one event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Participant record ID
    pub id: ParticipantId,
    /// Owning event
    pub event_id: EventId,
    /// Responder identity
    pub identity: Identity,
    /// Last known responder location, if shared
    pub location: Option<GeoPoint>,
    /// Confirmation timestamp
    pub confirmed_at: DateTime<Utc>,
}

// ============================================================================
// Inputs
// ============================================================================

/// Input for event creation.
#[derive(Clone, Debug, Deserialize)]
pub struct EventSpec {
    /// Event title
    pub title: String,
    /// Event description
    pub description: String,
    /// Event location
    pub location: GeoPoint,
    /// Pre-resolved address, if available
    pub address: Option<String>,
    /// Scheduled window start
    pub start_time: DateTime<Utc>,
    /// Scheduled window end
    pub end_time: DateTime<Utc>,
    /// Capacity threshold, must be at least 1
    pub required_attendees: u32,
}

/// Partial update of event details.
///
/// Location and the required-attendee count are deliberately outside the
/// generic edit: location changes go through geocoding and threshold changes
/// recompute the lock state, so both have dedicated paths.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EventPatch {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New window start
    pub start_time: Option<DateTime<Utc>>,
    /// New window end
    pub end_time: Option<DateTime<Utc>>,
}

impl EventPatch {
    /// True when the patch carries no changes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn identity_key_prefers_user_key() {
        let id = Identity {
            display_name: "Dana".to_string(),
            user_key: Some("user-42".to_string()),
        };
        assert_eq!(id.key(), "user-42");
    }

    #[test]
    fn anonymous_identity_keys_on_display_name() {
        let id = Identity::anonymous("Dana".to_string());
        assert_eq!(id.key(), "Dana");
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(EventPatch::default().is_empty());
        let patch = EventPatch {
            title: Some("New title".to_string()),
            ..EventPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn event_id_display_roundtrip() {
        let id = EventId::new();
        let parsed = EventId::from_uuid(id.to_string().parse().unwrap());
        assert_eq!(id, parsed);
    }
}
