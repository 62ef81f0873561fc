//! # Muster Core
//!
//! Coordination core for time-bounded group-response events.
//!
//! An event is opened with a required-attendee threshold, responders confirm
//! attendance, and once the threshold is reached the event locks further
//! edits. Every state change is fanned out to live subscribers.
//!
//! ## Core Concepts
//!
//! - **Event**: a coordinated response opportunity with a capacity threshold
//! - **Participant**: one identity's recorded confirmation for one event
//! - **Lock state**: `Open`/`Locked` flag derived from
//!   `participant_count >= required_attendees`, never set independently
//! - **AttendanceCoordinator**: owns the lifecycle state machine and
//!   serializes mutations per event
//! - **NotificationBus**: best-effort broadcast of state changes to
//!   subscriber channels
//!
//! ## Architecture Principles
//!
//! - Lock state is a pure function of two counters, recomputed atomically
//!   with every mutation that changes either
//! - Mutations for a single event are linearized; independent events never
//!   share a lock
//! - Notification delivery can never fail or block a mutation
//!
//! ## Example
//!
//! ```ignore
//! use muster_core::{AttendanceCoordinator, CoordinatorPolicy, Notification, NotificationBus};
//! use std::sync::Arc;
//!
//! let coordinator = AttendanceCoordinator::new(store, CoordinatorPolicy::default());
//! let bus = Arc::new(NotificationBus::new());
//!
//! let event = coordinator.create_event(spec).await?;
//! let outcome = coordinator.confirm_attendance(event.id, identity, None).await?;
//! bus.broadcast(&Notification::attendance_confirmed(&outcome.event, &outcome.participant));
//! ```

pub mod bus;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod policy;
pub mod store;
pub mod types;

pub use bus::{Notification, NotificationBus, SubscriberHandle};
pub use clock::{Clock, SystemClock};
pub use coordinator::{AttendanceCoordinator, ConfirmOutcome};
pub use error::{CoordinatorError, StoreError};
pub use policy::{CoordinatorPolicy, EditPolicy, JoinPolicy, LockState};
pub use store::{EventChanges, EventFilter, EventStore, NewEvent, NewParticipant};
pub use types::{
    Event, EventId, EventPatch, EventSpec, GeoPoint, Identity, Participant, ParticipantId,
    SubscriberId,
};
