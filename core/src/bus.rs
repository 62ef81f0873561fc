//! Notification bus: best-effort fan-out of state changes.
//!
//! The bus owns a mutex-guarded registry of subscriber channels. Broadcasts
//! are delivered to every registered channel; a channel whose receiver has
//! gone away is pruned on the spot and the failure never reaches the
//! caller. Sends go through unbounded channels, so a broadcast never blocks
//! the coordination path.
//!
//! # Message Protocol
//!
//! **Server → Client (state change):**
//! ```json
//! {
//!   "type": "attendance_confirmed",
//!   "event_id": "550e8400-...",
//!   "participant_id": "660e8400-...",
//!   "display_name": "Dana",
//!   "participant_count": 3,
//!   "lock_state": "locked"
//! }
//! ```
//!
//! **Server → Client (connection ack):**
//! ```json
//! {"type": "connected", "subscriber_id": "770e8400-..."}
//! ```

use crate::policy::LockState;
use crate::types::{Event, EventId, Participant, ParticipantId, SubscriberId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// State-change notification pushed to live subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Connection acknowledgment, sent once on subscribe
    Connected {
        /// Handle identity of the new subscriber
        subscriber_id: SubscriberId,
    },
    /// A new event was opened
    EventCreated {
        /// Event ID
        event_id: EventId,
        /// Event title
        title: String,
        /// Capacity threshold
        required_attendees: u32,
    },
    /// An identity confirmed attendance
    AttendanceConfirmed {
        /// Event ID
        event_id: EventId,
        /// Participant record ID
        participant_id: ParticipantId,
        /// Responder display name
        display_name: String,
        /// Confirmation count after this one
        participant_count: u64,
        /// Lock state after recomputation
        lock_state: LockState,
    },
    /// The required-attendee threshold was revised
    RequirementUpdated {
        /// Event ID
        event_id: EventId,
        /// New capacity threshold
        required_attendees: u32,
        /// Lock state after recomputation
        lock_state: LockState,
    },
    /// Event details were edited
    EventEdited {
        /// Event ID
        event_id: EventId,
        /// Title after the edit
        title: String,
    },
    /// Liveness reply to a client ping
    Pong,
}

impl Notification {
    /// Notification for a freshly created event.
    #[must_use]
    pub fn event_created(event: &Event) -> Self {
        Self::EventCreated {
            event_id: event.id,
            title: event.title.clone(),
            required_attendees: event.required_attendees,
        }
    }

    /// Notification for a recorded confirmation.
    #[must_use]
    pub fn attendance_confirmed(event: &Event, participant: &Participant) -> Self {
        Self::AttendanceConfirmed {
            event_id: event.id,
            participant_id: participant.id,
            display_name: participant.identity.display_name.clone(),
            participant_count: event.participant_count,
            lock_state: event.lock_state,
        }
    }

    /// Notification for a revised threshold.
    #[must_use]
    pub fn requirement_updated(event: &Event) -> Self {
        Self::RequirementUpdated {
            event_id: event.id,
            required_attendees: event.required_attendees,
            lock_state: event.lock_state,
        }
    }

    /// Notification for edited details.
    #[must_use]
    pub fn event_edited(event: &Event) -> Self {
        Self::EventEdited {
            event_id: event.id,
            title: event.title.clone(),
        }
    }
}

/// Handle returned by [`NotificationBus::subscribe`].
///
/// Dropping the handle (or its receiver) makes the next broadcast prune the
/// subscription; explicit [`NotificationBus::unsubscribe`] frees it eagerly.
pub struct SubscriberHandle {
    /// Identity of the subscription, used for unsubscribe
    pub id: SubscriberId,
    /// Receiving end of the subscriber channel
    pub receiver: mpsc::UnboundedReceiver<Notification>,
}

/// Registry of live subscriber channels.
///
/// Owned and shared by `Arc`; there is deliberately no global instance.
#[derive(Default)]
pub struct NotificationBus {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::UnboundedSender<Notification>>>,
}

impl NotificationBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new outbound channel.
    ///
    /// The connection ack is already queued on the returned receiver.
    #[must_use]
    pub fn subscribe(&self) -> SubscriberHandle {
        let id = SubscriberId::new();
        let (tx, receiver) = mpsc::unbounded_channel();

        // Queued before the sender is registered, so the ack is always the
        // first message a subscriber sees.
        let _ = tx.send(Notification::Connected { subscriber_id: id });

        self.lock_registry().insert(id, tx);
        debug!(subscriber_id = %id, "subscriber registered");
        SubscriberHandle { id, receiver }
    }

    /// Remove a channel. Idempotent: unknown ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.lock_registry().remove(&id).is_some() {
            debug!(subscriber_id = %id, "subscriber removed");
        }
    }

    /// Deliver `notification` to every registered channel.
    ///
    /// Best-effort: channels whose receiver has gone away are unsubscribed
    /// and no error propagates. Never blocks.
    pub fn broadcast(&self, notification: &Notification) {
        let mut registry = self.lock_registry();
        let before = registry.len();
        registry.retain(|id, tx| {
            let delivered = tx.send(notification.clone()).is_ok();
            if !delivered {
                warn!(subscriber_id = %id, "dropping dead subscriber");
            }
            delivered
        });
        debug!(
            delivered = registry.len(),
            pruned = before - registry.len(),
            "broadcast complete"
        );
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock_registry().len()
    }

    #[allow(clippy::unwrap_used)] // lock poisoning means a panicked thread; propagate
    fn lock_registry(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<SubscriberId, mpsc::UnboundedSender<Notification>>> {
        self.subscribers.lock().unwrap()
    }
}
