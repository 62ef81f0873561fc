//! Attendance coordinator: the event lifecycle state machine.
//!
//! Owns creation, confirmation, threshold updates, and edit gating. All
//! mutating operations for one event are linearized behind a per-event
//! async mutex, so no two concurrent confirmations can both observe a stale
//! count; operations on different events never share a lock.
//!
//! Validation happens before the lock is taken and before any write, so a
//! rejected request performs no mutation. A transient store conflict is
//! retried exactly once inside the serialization scope.

use crate::clock::{Clock, SystemClock};
use crate::error::{CoordinatorError, StoreError};
use crate::policy::CoordinatorPolicy;
use crate::store::{EventChanges, EventFilter, EventStore, NewEvent, NewParticipant};
use crate::types::{
    Event, EventId, EventPatch, EventSpec, GeoPoint, Identity, Participant, ParticipantId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};

/// Maximum title length accepted on create and edit.
const MAX_TITLE_LEN: usize = 200;
/// Maximum description length accepted on create and edit.
const MAX_DESCRIPTION_LEN: usize = 2000;
/// Maximum display-name length accepted on confirmation.
const MAX_DISPLAY_NAME_LEN: usize = 64;

/// Result of a successful confirmation.
#[derive(Clone, Debug)]
pub struct ConfirmOutcome {
    /// The event after the confirmation, lock state recomputed
    pub event: Event,
    /// The newly appended participant record
    pub participant: Participant,
}

/// Coordinates the event lifecycle over an [`EventStore`].
///
/// Cheap to share: hold it in an `Arc` and clone the `Arc` per request
/// handler.
pub struct AttendanceCoordinator {
    store: Arc<dyn EventStore>,
    policy: CoordinatorPolicy,
    clock: Arc<dyn Clock>,
    /// Per-event serialization points. Entries are created on first use and
    /// held weakly: once every in-flight mutation of an event has finished,
    /// its entry is dead and gets pruned on the next miss, so the map is
    /// bounded by the number of events under concurrent mutation.
    event_locks: Mutex<HashMap<EventId, Weak<tokio::sync::Mutex<()>>>>,
}

impl AttendanceCoordinator {
    /// Create a coordinator with the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, policy: CoordinatorPolicy) -> Self {
        Self::with_clock(store, policy, Arc::new(SystemClock))
    }

    /// Create a coordinator with an explicit clock (tests pin time here).
    #[must_use]
    pub fn with_clock(
        store: Arc<dyn EventStore>,
        policy: CoordinatorPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            policy,
            clock,
            event_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The policy this coordinator was configured with.
    #[must_use]
    pub const fn policy(&self) -> CoordinatorPolicy {
        self.policy
    }

    /// Validate and persist a new event.
    ///
    /// The event starts `Open` with zero participants.
    ///
    /// # Errors
    ///
    /// - `InvalidSpec` if `required_attendees < 1`, the window is not
    ///   forward (`end_time <= start_time`), or title/description bounds
    ///   are violated
    /// - `Store` on store failure
    pub async fn create_event(&self, spec: EventSpec) -> Result<Event, CoordinatorError> {
        validate_spec(&spec)?;

        let event = NewEvent {
            id: EventId::new(),
            title: spec.title,
            description: spec.description,
            location: spec.location,
            address: spec.address,
            start_time: spec.start_time,
            end_time: spec.end_time,
            required_attendees: spec.required_attendees,
            created_at: self.clock.now(),
        };

        let created = self.store.create_event(event).await?;
        info!(event_id = %created.id, required = created.required_attendees, "event created");
        Ok(created)
    }

    /// Load one event.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the id is unknown
    /// - `Store` on store failure
    pub async fn get_event(&self, event_id: EventId) -> Result<Event, CoordinatorError> {
        self.store
            .get_event(event_id)
            .await?
            .ok_or(CoordinatorError::NotFound(event_id))
    }

    /// List events matching `filter` as of now.
    ///
    /// # Errors
    ///
    /// - `Store` on store failure
    pub async fn list_events(&self, filter: EventFilter) -> Result<Vec<Event>, CoordinatorError> {
        Ok(self.store.list_events(filter, self.clock.now()).await?)
    }

    /// Load one event together with its participant list.
    ///
    /// Serialized with mutations of the same event, so the embedded list
    /// always agrees with the event's counters; two separate reads could
    /// race a concurrent confirmation.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `Store` on store failure
    pub async fn event_details(
        &self,
        event_id: EventId,
    ) -> Result<(Event, Vec<Participant>), CoordinatorError> {
        let guard = self.event_lock(event_id);
        let _serialized = guard.lock().await;

        let event = self
            .store
            .get_event(event_id)
            .await?
            .ok_or(CoordinatorError::NotFound(event_id))?;
        let participants = self.store.list_participants(event_id).await?;
        Ok((event, participants))
    }

    /// List the recorded confirmations for an event, oldest first.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `Store` on store failure
    pub async fn list_participants(
        &self,
        event_id: EventId,
    ) -> Result<Vec<Participant>, CoordinatorError> {
        Ok(self.store.list_participants(event_id).await?)
    }

    /// Record a confirmation of attendance.
    ///
    /// Serialized with every other mutation of the same event. On success
    /// the participant is appended and the lock state recomputed in one
    /// atomic store operation.
    ///
    /// # Errors
    ///
    /// - `InvalidSpec` if the display name is empty or too long
    /// - `NotFound` if the event does not exist
    /// - `EventUnavailable` if the join policy forbids confirmations in the
    ///   current lock state
    /// - `DuplicateParticipant` if the identity already confirmed
    /// - `Store` on store failure
    pub async fn confirm_attendance(
        &self,
        event_id: EventId,
        identity: Identity,
        location: Option<GeoPoint>,
    ) -> Result<ConfirmOutcome, CoordinatorError> {
        validate_identity(&identity)?;

        let guard = self.event_lock(event_id);
        let _serialized = guard.lock().await;

        let current = self
            .store
            .get_event(event_id)
            .await?
            .ok_or(CoordinatorError::NotFound(event_id))?;

        if !self.policy.join.allows_join(current.lock_state) {
            debug!(event_id = %event_id, "confirmation rejected by join policy");
            return Err(CoordinatorError::EventUnavailable { event_id });
        }

        let participant = NewParticipant {
            id: ParticipantId::new(),
            event_id,
            identity,
            location,
            confirmed_at: self.clock.now(),
        };

        let (event, participant) = self
            .with_conflict_retry(|| {
                let participant = participant.clone();
                async move { self.store.append_participant(participant).await }
            })
            .await?;

        info!(
            event_id = %event_id,
            participant_count = event.participant_count,
            lock_state = %event.lock_state,
            "attendance confirmed"
        );
        Ok(ConfirmOutcome { event, participant })
    }

    /// Revise the required-attendee threshold.
    ///
    /// May flip the lock state in either direction: raising the threshold
    /// above the current count reopens a locked event, lowering it to or
    /// below the count locks an open one.
    ///
    /// # Errors
    ///
    /// - `InvalidSpec` if `new_required < 1`
    /// - `NotFound` if the event does not exist
    /// - `Store` on store failure
    pub async fn update_required_attendees(
        &self,
        event_id: EventId,
        new_required: u32,
    ) -> Result<Event, CoordinatorError> {
        if new_required < 1 {
            return Err(CoordinatorError::InvalidSpec(
                "required_attendees must be at least 1".to_string(),
            ));
        }

        let guard = self.event_lock(event_id);
        let _serialized = guard.lock().await;

        let changes = EventChanges {
            required_attendees: Some(new_required),
            patch: None,
        };
        let event = self
            .with_conflict_retry(|| {
                let changes = changes.clone();
                async move { self.store.update_event(event_id, changes).await }
            })
            .await?;

        info!(
            event_id = %event_id,
            required = new_required,
            lock_state = %event.lock_state,
            "required attendees updated"
        );
        Ok(event)
    }

    /// Apply a partial edit to event details.
    ///
    /// Covers title, description, and the time window only. Gated by the
    /// edit-permission predicate for the current lock state.
    ///
    /// # Errors
    ///
    /// - `InvalidSpec` if a patched field violates its bounds or the
    ///   resulting window is not forward
    /// - `NotFound` if the event does not exist
    /// - `EditLocked` if the edit policy forbids edits in the current state
    /// - `Store` on store failure
    pub async fn edit_event_details(
        &self,
        event_id: EventId,
        patch: EventPatch,
    ) -> Result<Event, CoordinatorError> {
        validate_patch(&patch)?;

        let guard = self.event_lock(event_id);
        let _serialized = guard.lock().await;

        let current = self
            .store
            .get_event(event_id)
            .await?
            .ok_or(CoordinatorError::NotFound(event_id))?;

        if !self.policy.edit.allows_edit(current.lock_state) {
            debug!(event_id = %event_id, lock_state = %current.lock_state, "edit rejected");
            return Err(CoordinatorError::EditLocked { event_id });
        }

        // The patched window must stay forward.
        let start = patch.start_time.unwrap_or(current.start_time);
        let end = patch.end_time.unwrap_or(current.end_time);
        if end <= start {
            return Err(CoordinatorError::InvalidSpec(
                "end_time must be after start_time".to_string(),
            ));
        }

        let changes = EventChanges {
            required_attendees: None,
            patch: Some(patch),
        };
        let event = self
            .with_conflict_retry(|| {
                let changes = changes.clone();
                async move { self.store.update_event(event_id, changes).await }
            })
            .await?;

        info!(event_id = %event_id, "event details edited");
        Ok(event)
    }

    /// The serialization point for one event, created on first use.
    ///
    /// Callers hold the returned `Arc` for the duration of the critical
    /// section, which keeps the entry upgradeable for concurrent callers.
    fn event_lock(&self, event_id: EventId) -> Arc<tokio::sync::Mutex<()>> {
        #[allow(clippy::unwrap_used)] // lock poisoning means a panicked thread; propagate
        let mut locks = self.event_locks.lock().unwrap();
        if let Some(existing) = locks.get(&event_id).and_then(Weak::upgrade) {
            return existing;
        }
        // Miss: drop entries whose last holder is gone before adding one.
        locks.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(event_id, Arc::downgrade(&lock));
        lock
    }

    /// Run a store mutation, retrying exactly once on a transient conflict.
    ///
    /// Callers hold the per-event lock across the whole call, so the retry
    /// observes a quiesced event.
    async fn with_conflict_retry<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        match op().await {
            Err(StoreError::Conflict(reason)) => {
                warn!(%reason, "transient store conflict, retrying once");
                op().await
            }
            other => other,
        }
    }
}

fn validate_spec(spec: &EventSpec) -> Result<(), CoordinatorError> {
    if spec.required_attendees < 1 {
        return Err(CoordinatorError::InvalidSpec(
            "required_attendees must be at least 1".to_string(),
        ));
    }
    if spec.end_time <= spec.start_time {
        return Err(CoordinatorError::InvalidSpec(
            "end_time must be after start_time".to_string(),
        ));
    }
    validate_title(&spec.title)?;
    validate_description(&spec.description)?;
    Ok(())
}

fn validate_patch(patch: &EventPatch) -> Result<(), CoordinatorError> {
    if let Some(title) = &patch.title {
        validate_title(title)?;
    }
    if let Some(description) = &patch.description {
        validate_description(description)?;
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<(), CoordinatorError> {
    if title.is_empty() || title.len() > MAX_TITLE_LEN {
        return Err(CoordinatorError::InvalidSpec(format!(
            "title must be 1..={MAX_TITLE_LEN} bytes"
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), CoordinatorError> {
    if description.is_empty() || description.len() > MAX_DESCRIPTION_LEN {
        return Err(CoordinatorError::InvalidSpec(format!(
            "description must be 1..={MAX_DESCRIPTION_LEN} bytes"
        )));
    }
    Ok(())
}

fn validate_identity(identity: &Identity) -> Result<(), CoordinatorError> {
    if identity.display_name.is_empty() || identity.display_name.len() > MAX_DISPLAY_NAME_LEN {
        return Err(CoordinatorError::InvalidSpec(format!(
            "display_name must be 1..={MAX_DISPLAY_NAME_LEN} bytes"
        )));
    }
    Ok(())
}
