//! State - 割り当て先ごとに計算される表示状態
//!
//! `CalculatedState` is never stored as the source of truth; it is derived by
//! the resolver from the task definition, the clock and the assignee's cycle
//! flags. The engine keeps the last published value only to emit
//! `StateChanged` notifications on transitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Externally visible state of a task for one assignee.
///
/// Variants are declared in resolver priority order (highest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculatedState {
    Approved,
    Claimed,
    NotMyTurn,
    Missed,
    Overdue,
    Waiting,
    Due,
    Pending,
}

impl CalculatedState {
    pub const ALL: [CalculatedState; 8] = [
        CalculatedState::Approved,
        CalculatedState::Claimed,
        CalculatedState::NotMyTurn,
        CalculatedState::Missed,
        CalculatedState::Overdue,
        CalculatedState::Waiting,
        CalculatedState::Due,
        CalculatedState::Pending,
    ];

    /// The lock reason mirrored by this state, if it blocks claiming.
    pub fn lock_reason(self) -> Option<LockReason> {
        match self {
            CalculatedState::NotMyTurn => Some(LockReason::NotMyTurn),
            CalculatedState::Missed => Some(LockReason::Missed),
            CalculatedState::Waiting => Some(LockReason::Waiting),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CalculatedState::Approved => "approved",
            CalculatedState::Claimed => "claimed",
            CalculatedState::NotMyTurn => "not_my_turn",
            CalculatedState::Missed => "missed",
            CalculatedState::Overdue => "overdue",
            CalculatedState::Waiting => "waiting",
            CalculatedState::Due => "due",
            CalculatedState::Pending => "pending",
        }
    }
}

impl fmt::Display for CalculatedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable cause of a claim denial that comes from the resolved state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    NotMyTurn,
    Missed,
    Waiting,
}

impl LockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            LockReason::NotMyTurn => "not_my_turn",
            LockReason::Missed => "missed",
            LockReason::Waiting => "waiting",
        }
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the resolver: a state plus its lock reason.
///
/// Only constructible through [`Resolution::of`], which keeps `lock_reason`
/// in sync with `state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    state: CalculatedState,
    lock_reason: Option<LockReason>,
}

impl Resolution {
    pub fn of(state: CalculatedState) -> Self {
        Self {
            state,
            lock_reason: state.lock_reason(),
        }
    }

    pub fn state(&self) -> CalculatedState {
        self.state
    }

    pub fn lock_reason(&self) -> Option<LockReason> {
        self.lock_reason
    }

    pub fn is_locked(&self) -> bool {
        self.lock_reason.is_some()
    }
}
