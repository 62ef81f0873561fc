//! Time source seam.
//!
//! The coordinator stamps events and confirmations through this trait so
//! tests can pin time (`muster-testing` provides `FixedClock`).

use chrono::{DateTime, Utc};

/// Time source for deterministic testing.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
