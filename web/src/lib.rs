//! # Muster Web
//!
//! Axum gateway for the muster coordination core.
//!
//! Translates HTTP requests into `AttendanceCoordinator` operations and
//! forwards coordinator outcomes to the `NotificationBus`. Live observers
//! subscribe over WebSocket and receive every state-change broadcast.
//!
//! The gateway is deliberately thin: validation, policy, and the lock-state
//! machine live in `muster-core`; this crate only maps transport to domain
//! and domain errors to HTTP responses.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
