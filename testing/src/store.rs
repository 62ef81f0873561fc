//! In-memory event store.
//!
//! `HashMap` state behind an async `RwLock`, with the same observable
//! semantics as the Postgres implementation: every mutation recomputes the
//! lock flag atomically, duplicates are rejected on the identity key, and
//! transient conflicts can be injected to exercise retry paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use muster_core::{
    Event, EventChanges, EventFilter, EventId, EventStore, LockState, NewEvent, NewParticipant,
    Participant, StoreError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;

/// One event with its append-only participant log.
#[derive(Clone, Debug)]
struct EventRecord {
    event: Event,
    participants: Vec<Participant>,
}

impl EventRecord {
    /// Recompute the derived fields after a mutation, in the same critical
    /// section as the mutation itself.
    fn refresh_derived(&mut self) {
        self.event.participant_count = self.participants.len() as u64;
        self.event.lock_state =
            LockState::for_counts(self.event.participant_count, self.event.required_attendees);
    }
}

/// Deterministic in-memory [`EventStore`] for tests.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: RwLock<HashMap<EventId, EventRecord>>,
    /// Pending injected conflicts; each mutating call consumes one.
    injected_conflicts: AtomicU32,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` participant appends or event updates fail with
    /// a transient conflict before applying anything.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_injected_conflict(&self) -> Result<(), StoreError> {
        let consumed = self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            Err(StoreError::Conflict("injected conflict".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let stored = Event {
            id: event.id,
            title: event.title,
            description: event.description,
            location: event.location,
            address: event.address,
            start_time: event.start_time,
            end_time: event.end_time,
            required_attendees: event.required_attendees,
            lock_state: LockState::Open,
            participant_count: 0,
            created_at: event.created_at,
        };
        let mut events = self.events.write().await;
        events.insert(
            stored.id,
            EventRecord {
                event: stored.clone(),
                participants: Vec::new(),
            },
        );
        Ok(stored)
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        let events = self.events.read().await;
        Ok(events.get(&id).map(|record| record.event.clone()))
    }

    async fn list_events(
        &self,
        filter: EventFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let events = self.events.read().await;
        let mut listed: Vec<Event> = events
            .values()
            .map(|record| record.event.clone())
            .filter(|event| match filter {
                EventFilter::Upcoming => event.end_time >= now,
                EventFilter::Historical => event.end_time < now,
                EventFilter::All => true,
            })
            .collect();
        match filter {
            EventFilter::Historical => listed.sort_by_key(|e| std::cmp::Reverse(e.start_time)),
            EventFilter::Upcoming | EventFilter::All => listed.sort_by_key(|e| e.start_time),
        }
        Ok(listed)
    }

    async fn append_participant(
        &self,
        participant: NewParticipant,
    ) -> Result<(Event, Participant), StoreError> {
        self.take_injected_conflict()?;

        let mut events = self.events.write().await;
        let record = events
            .get_mut(&participant.event_id)
            .ok_or(StoreError::NotFound(participant.event_id))?;

        let key = participant.identity.key();
        if record
            .participants
            .iter()
            .any(|existing| existing.identity.key() == key)
        {
            return Err(StoreError::Duplicate {
                event_id: participant.event_id,
            });
        }

        let stored = Participant {
            id: participant.id,
            event_id: participant.event_id,
            identity: participant.identity,
            location: participant.location,
            confirmed_at: participant.confirmed_at,
        };
        record.participants.push(stored.clone());
        record.refresh_derived();
        Ok((record.event.clone(), stored))
    }

    async fn count_participants(&self, id: EventId) -> Result<u64, StoreError> {
        let events = self.events.read().await;
        let record = events.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(record.participants.len() as u64)
    }

    async fn list_participants(&self, id: EventId) -> Result<Vec<Participant>, StoreError> {
        let events = self.events.read().await;
        let record = events.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(record.participants.clone())
    }

    async fn update_event(&self, id: EventId, changes: EventChanges) -> Result<Event, StoreError> {
        self.take_injected_conflict()?;

        let mut events = self.events.write().await;
        let record = events.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if let Some(required) = changes.required_attendees {
            record.event.required_attendees = required;
        }
        if let Some(patch) = changes.patch {
            if let Some(title) = patch.title {
                record.event.title = title;
            }
            if let Some(description) = patch.description {
                record.event.description = description;
            }
            if let Some(start_time) = patch.start_time {
                record.event.start_time = start_time;
            }
            if let Some(end_time) = patch.end_time {
                record.event.end_time = end_time;
            }
        }
        record.refresh_derived();
        Ok(record.event.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use muster_core::{GeoPoint, Identity, ParticipantId};

    fn new_event(required: u32, start: DateTime<Utc>) -> NewEvent {
        NewEvent {
            id: EventId::new(),
            title: "Muster point".to_string(),
            description: "Assemble at the gate".to_string(),
            location: GeoPoint {
                lat: 32.08,
                lng: 34.78,
            },
            address: None,
            start_time: start,
            end_time: start + Duration::hours(2),
            required_attendees: required,
            created_at: start - Duration::days(1),
        }
    }

    fn new_participant(event_id: EventId, name: &str, at: DateTime<Utc>) -> NewParticipant {
        NewParticipant {
            id: ParticipantId::new(),
            event_id,
            identity: Identity::anonymous(name.to_string()),
            location: None,
            confirmed_at: at,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn append_recomputes_lock_atomically() {
        let store = InMemoryEventStore::new();
        let created = store.create_event(new_event(2, t0())).await.unwrap();
        assert_eq!(created.lock_state, LockState::Open);

        let (event, _) = store
            .append_participant(new_participant(created.id, "a", t0()))
            .await
            .unwrap();
        assert_eq!(event.lock_state, LockState::Open);
        assert_eq!(event.participant_count, 1);

        let (event, _) = store
            .append_participant(new_participant(created.id, "b", t0()))
            .await
            .unwrap();
        assert_eq!(event.lock_state, LockState::Locked);
        assert_eq!(event.participant_count, 2);
    }

    #[tokio::test]
    async fn duplicate_identity_key_is_rejected() {
        let store = InMemoryEventStore::new();
        let created = store.create_event(new_event(5, t0())).await.unwrap();

        store
            .append_participant(new_participant(created.id, "dana", t0()))
            .await
            .unwrap();
        let err = store
            .append_participant(new_participant(created.id, "dana", t0()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
        assert_eq!(store.count_participants(created.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_events_splits_on_end_time() {
        let store = InMemoryEventStore::new();
        let now = t0();
        let past = store
            .create_event(new_event(1, now - Duration::days(2)))
            .await
            .unwrap();
        let future = store
            .create_event(new_event(1, now + Duration::days(1)))
            .await
            .unwrap();

        let upcoming = store.list_events(EventFilter::Upcoming, now).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, future.id);

        let historical = store
            .list_events(EventFilter::Historical, now)
            .await
            .unwrap();
        assert_eq!(historical.len(), 1);
        assert_eq!(historical[0].id, past.id);

        assert_eq!(
            store.list_events(EventFilter::All, now).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn injected_conflicts_fail_then_clear() {
        let store = InMemoryEventStore::new();
        let created = store.create_event(new_event(1, t0())).await.unwrap();

        store.inject_conflicts(1);
        let err = store
            .append_participant(new_participant(created.id, "x", t0()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // The conflict consumed nothing; the retry succeeds.
        store
            .append_participant(new_participant(created.id, "x", t0()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_event_is_not_found() {
        let store = InMemoryEventStore::new();
        let id = EventId::new();
        assert!(store.get_event(id).await.unwrap().is_none());
        assert!(matches!(
            store.count_participants(id).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            store
                .append_participant(new_participant(id, "x", t0()))
                .await
                .unwrap_err(),
            StoreError::NotFound(_)
        ));
    }
}
