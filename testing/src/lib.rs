//! # Muster Testing
//!
//! Testing utilities for the muster coordination core.
//!
//! This crate provides:
//! - [`InMemoryEventStore`]: a fast, deterministic
//!   [`muster_core::EventStore`] implementation with the same semantics as
//!   the Postgres store
//! - [`mocks::FixedClock`]: a pinned time source
//! - Conflict injection for exercising the coordinator's retry path
//!
//! ## Example
//!
//! ```ignore
//! use muster_core::{AttendanceCoordinator, CoordinatorPolicy};
//! use muster_testing::InMemoryEventStore;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_confirmation_flow() {
//!     let store = Arc::new(InMemoryEventStore::new());
//!     let coordinator = AttendanceCoordinator::new(store, CoordinatorPolicy::default());
//!
//!     let event = coordinator.create_event(spec).await.unwrap();
//!     assert_eq!(event.participant_count, 0);
//! }
//! ```

pub mod store;

pub use store::InMemoryEventStore;

/// Mock implementations for testing.
pub mod mocks {
    use chrono::{DateTime, Utc};
    use muster_core::Clock;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use muster_testing::mocks::FixedClock;
    /// use muster_core::Clock;
    /// use chrono::{TimeZone, Utc};
    ///
    /// let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Clone, Copy, Debug)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a clock pinned to `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }
}
