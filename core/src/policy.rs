//! Lock-state machine and coordination policies.
//!
//! The lock state is a pure function of two counters: an event is `Locked`
//! exactly when its participant count has reached the required-attendee
//! threshold. Every mutation that changes either counter recomputes the
//! flag; nothing else may set it.
//!
//! Observed product variants disagree on what the lock *means* for editing:
//! some freeze event details once enough responders have committed, others
//! only allow editing after the threshold is met. Both polarities are kept
//! as an explicit policy flag rather than hard-coding one assumption.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived Open/Locked flag controlling whether edits are permitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Threshold not yet reached
    Open,
    /// Threshold reached
    Locked,
}

impl LockState {
    /// Derive the lock state from the two counters.
    ///
    /// This is the single transition rule of the state machine: `Locked`
    /// iff `participant_count >= required_attendees`.
    #[must_use]
    pub const fn for_counts(participant_count: u64, required_attendees: u32) -> Self {
        if participant_count >= required_attendees as u64 {
            Self::Locked
        } else {
            Self::Open
        }
    }

    /// True when the state is `Locked`.
    #[must_use]
    pub const fn is_locked(self) -> bool {
        matches!(self, Self::Locked)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Locked => write!(f, "locked"),
        }
    }
}

/// When event details may be edited, relative to the lock state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPolicy {
    /// Details may be edited only while `Open`: freeze once enough
    /// responders have committed (canonical).
    #[default]
    WhileOpen,
    /// Details may be edited only once `Locked`: the opposite polarity some
    /// product variants used.
    WhileLocked,
}

impl EditPolicy {
    /// Edit-permission predicate for the current lock state.
    #[must_use]
    pub const fn allows_edit(self, lock_state: LockState) -> bool {
        match self {
            Self::WhileOpen => matches!(lock_state, LockState::Open),
            Self::WhileLocked => matches!(lock_state, LockState::Locked),
        }
    }
}

/// Whether new confirmations are accepted once an event is `Locked`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Confirmations are accepted regardless of lock state; the count may
    /// exceed the threshold (canonical).
    #[default]
    AlwaysOpen,
    /// Confirmations are rejected with `EventUnavailable` once `Locked`.
    RejectWhenLocked,
}

impl JoinPolicy {
    /// Join-permission predicate for the current lock state.
    #[must_use]
    pub const fn allows_join(self, lock_state: LockState) -> bool {
        match self {
            Self::AlwaysOpen => true,
            Self::RejectWhenLocked => !lock_state.is_locked(),
        }
    }
}

/// Combined policy configuration for the coordinator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorPolicy {
    /// Edit-permission polarity
    pub edit: EditPolicy,
    /// Join behavior after lock
    pub join: JoinPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_state_derivation() {
        assert_eq!(LockState::for_counts(0, 3), LockState::Open);
        assert_eq!(LockState::for_counts(2, 3), LockState::Open);
        assert_eq!(LockState::for_counts(3, 3), LockState::Locked);
        assert_eq!(LockState::for_counts(7, 3), LockState::Locked);
        assert_eq!(LockState::for_counts(0, 1), LockState::Open);
        assert_eq!(LockState::for_counts(1, 1), LockState::Locked);
    }

    #[test]
    fn edit_policy_polarities() {
        assert!(EditPolicy::WhileOpen.allows_edit(LockState::Open));
        assert!(!EditPolicy::WhileOpen.allows_edit(LockState::Locked));
        assert!(!EditPolicy::WhileLocked.allows_edit(LockState::Open));
        assert!(EditPolicy::WhileLocked.allows_edit(LockState::Locked));
    }

    #[test]
    fn join_policy_gating() {
        assert!(JoinPolicy::AlwaysOpen.allows_join(LockState::Locked));
        assert!(JoinPolicy::RejectWhenLocked.allows_join(LockState::Open));
        assert!(!JoinPolicy::RejectWhenLocked.allows_join(LockState::Locked));
    }

    #[test]
    fn default_policy_is_canonical() {
        let policy = CoordinatorPolicy::default();
        assert_eq!(policy.edit, EditPolicy::WhileOpen);
        assert_eq!(policy.join, JoinPolicy::AlwaysOpen);
    }
}
