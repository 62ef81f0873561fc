//! Event store contract.
//!
//! The store is the durable record of events and participants. The trait is
//! deliberately minimal: each mutating operation is a single atomic unit
//! that recomputes the lock flag in the same transaction, so "insert
//! participant, read count, write lock state" can never be observed half
//! done. Multi-operation sequences (policy checks followed by a mutation)
//! are serialized per event by the coordinator on top of this contract.
//!
//! # Implementations
//!
//! - `PostgresEventStore` (in `muster-postgres`): production implementation
//! - `InMemoryEventStore` (in `muster-testing`): fast, deterministic testing
//!
//! # Dyn Compatibility
//!
//! The trait is `async_trait` so it can be held as `Arc<dyn EventStore>` by
//! the coordinator and shared across request handlers.

use crate::error::StoreError;
use crate::types::{Event, EventId, EventPatch, GeoPoint, Identity, Participant, ParticipantId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row to persist for a new event.
///
/// The store derives nothing from this: the coordinator has already
/// validated the spec and fixed the id, timestamps, and initial lock state.
#[derive(Clone, Debug)]
pub struct NewEvent {
    /// Event ID chosen by the coordinator
    pub id: EventId,
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
    /// Capacity threshold
    pub required_attendees: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Row to persist for a new participant.
#[derive(Clone, Debug)]
pub struct NewParticipant {
    /// Participant record ID chosen by the coordinator
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

/// Changes applied by [`EventStore::update_event`] in one atomic unit.
///
/// When `required_attendees` is set, the store recomputes the lock flag
/// against the current participant count inside the same transaction.
#[derive(Clone, Debug, Default)]
pub struct EventChanges {
    /// New capacity threshold
    pub required_attendees: Option<u32>,
    /// Patched detail fields
    pub patch: Option<EventPatch>,
}

/// Filter for event listings, relative to a caller-supplied "now".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventFilter {
    /// Events whose window has not ended (`end_time >= now`), soonest first
    Upcoming,
    /// Events whose window has ended (`end_time < now`), most recent first
    Historical,
    /// All events, soonest first
    All,
}

/// Durable record of events and participants.
///
/// # Atomicity
///
/// `append_participant` and `update_event` each commit their row change
/// *and* the recomputed lock flag in a single transaction. The lock flag is
/// always [`crate::policy::LockState::for_counts`] of the post-mutation
/// counters; callers never write it directly.
///
/// # Errors
///
/// All operations return [`StoreError`]; `Conflict` marks transient
/// failures the caller may retry.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event with zero participants and an `Open` lock flag.
    ///
    /// # Errors
    ///
    /// - `Database` on connection or query failure
    async fn create_event(&self, event: NewEvent) -> Result<Event, StoreError>;

    /// Load one event, or `None` if the id is unknown.
    ///
    /// # Errors
    ///
    /// - `Database` on connection or query failure
    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError>;

    /// List events matching `filter`, evaluated against `now`.
    ///
    /// # Errors
    ///
    /// - `Database` on connection or query failure
    async fn list_events(
        &self,
        filter: EventFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError>;

    /// Append a participant and recompute the lock flag atomically.
    ///
    /// Returns the updated event and the stored participant.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `Duplicate` if the identity key already has a record for the event
    /// - `Conflict` on a transient concurrency conflict (retryable)
    /// - `Database` on connection or query failure
    async fn append_participant(
        &self,
        participant: NewParticipant,
    ) -> Result<(Event, Participant), StoreError>;

    /// Count recorded confirmations for an event.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `Database` on connection or query failure
    async fn count_participants(&self, id: EventId) -> Result<u64, StoreError>;

    /// List recorded confirmations for an event, oldest first.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `Database` on connection or query failure
    async fn list_participants(&self, id: EventId) -> Result<Vec<Participant>, StoreError>;

    /// Apply `changes` and recompute the lock flag atomically.
    ///
    /// Returns the updated event.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the event does not exist
    /// - `Conflict` on a transient concurrency conflict (retryable)
    /// - `Database` on connection or query failure
    async fn update_event(&self, id: EventId, changes: EventChanges) -> Result<Event, StoreError>;
}
