//! Application state for the muster HTTP server.
//!
//! Contains the shared resources handlers need: the attendance coordinator
//! and the notification bus. Cloned (cheaply via `Arc`) for each request.

use muster_core::{AttendanceCoordinator, Notification, NotificationBus};
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle state machine; all mutations go through it
    pub coordinator: Arc<AttendanceCoordinator>,
    /// Live-subscriber registry for state-change broadcasts
    pub bus: Arc<NotificationBus>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(coordinator: Arc<AttendanceCoordinator>, bus: Arc<NotificationBus>) -> Self {
        Self { coordinator, bus }
    }

    /// Fan a notification out to subscribers on a detached task.
    ///
    /// Called after the mutation has committed; subscriber slowness or
    /// failure can never block or fail the mutating request.
    pub fn publish(&self, notification: Notification) {
        let bus = self.bus.clone();
        tokio::spawn(async move {
            bus.broadcast(&notification);
        });
    }
}
