//! Error taxonomy for the coordination core.
//!
//! Client-caused failures (`InvalidSpec`, `NotFound`, `DuplicateParticipant`,
//! `EventUnavailable`, `EditLocked`) are rejected before any mutation and
//! surface as client errors at the gateway. Store failures surface as server
//! errors, except transient conflicts which the coordinator retries once at
//! the serialization boundary.

use crate::types::EventId;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Uniqueness constraint hit: the identity already has a participant
    /// record for this event.
    #[error("Duplicate participant for event {event_id}")]
    Duplicate {
        /// The event the duplicate confirmation targeted.
        event_id: EventId,
    },

    /// Event not found in the store.
    #[error("Event not found: {0}")]
    NotFound(EventId),

    /// Transient concurrency conflict (e.g. serialization failure).
    ///
    /// Retryable: the coordinator re-runs the mutation once before giving
    /// up.
    #[error("Transient store conflict: {0}")]
    Conflict(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Errors returned by [`AttendanceCoordinator`](crate::AttendanceCoordinator)
/// operations.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Bad input shape or values, rejected before any mutation.
    #[error("Invalid event spec: {0}")]
    InvalidSpec(String),

    /// Unknown event.
    #[error("Event not found: {0}")]
    NotFound(EventId),

    /// The identity already has a participant record for this event.
    #[error("Identity already confirmed for event {event_id}")]
    DuplicateParticipant {
        /// The event the duplicate confirmation targeted.
        event_id: EventId,
    },

    /// Policy forbids new confirmations in the current lock state.
    #[error("Event {event_id} is not accepting confirmations")]
    EventUnavailable {
        /// The event the confirmation targeted.
        event_id: EventId,
    },

    /// The edit-permission predicate is false for the current lock state.
    #[error("Event {event_id} details are locked for editing")]
    EditLocked {
        /// The event the edit targeted.
        event_id: EventId,
    },

    /// Store failure that is not one of the client-error cases above.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl CoordinatorError {
    /// True for errors caused by the caller rather than the system.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

impl From<StoreError> for CoordinatorError {
    /// Lift store errors into the coordinator taxonomy, mapping the
    /// client-attributable variants to their domain counterparts.
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { event_id } => Self::DuplicateParticipant { event_id },
            StoreError::NotFound(event_id) => Self::NotFound(event_id),
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_domain_errors() {
        let id = EventId::new();
        assert!(matches!(
            CoordinatorError::from(StoreError::Duplicate { event_id: id }),
            CoordinatorError::DuplicateParticipant { event_id } if event_id == id
        ));
        assert!(matches!(
            CoordinatorError::from(StoreError::NotFound(id)),
            CoordinatorError::NotFound(e) if e == id
        ));
        assert!(matches!(
            CoordinatorError::from(StoreError::Database("boom".to_string())),
            CoordinatorError::Store(StoreError::Database(_))
        ));
    }

    #[test]
    fn client_error_classification() {
        let id = EventId::new();
        assert!(CoordinatorError::NotFound(id).is_client_error());
        assert!(CoordinatorError::InvalidSpec("x".to_string()).is_client_error());
        assert!(!CoordinatorError::Store(StoreError::Conflict("c".to_string())).is_client_error());
    }
}
