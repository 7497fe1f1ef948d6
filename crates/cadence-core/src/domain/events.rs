//! Events - ドメインイベント
//!
//! Everything the engine tells the outside world goes through `DomainEvent`.
//! Events are emitted only after the state change they describe has been
//! persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AssigneeId, TaskId};
use super::state::{CalculatedState, LockReason};

/// Why a missed record was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedReason {
    /// `clear_and_mark_missed`: still delinquent when the boundary fired.
    ClearedAtBoundary,
    /// `mark_missed_and_lock`: locked out when the due date passed.
    LockedPastDue,
    /// `allow_steal`: the turn-holder let the due date pass.
    TurnForfeited,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    StateChanged {
        task_id: TaskId,
        assignee_id: AssigneeId,
        /// `None` the first time a state is published for this assignee.
        old: Option<CalculatedState>,
        new: CalculatedState,
        lock_reason: Option<LockReason>,
    },
    Approved {
        task_id: TaskId,
        assignee_id: AssigneeId,
        effective_at: DateTime<Utc>,
    },
    Missed {
        task_id: TaskId,
        assignee_id: AssigneeId,
        due_at: DateTime<Utc>,
        reason: MissedReason,
    },
    RotationAdvanced {
        task_id: TaskId,
        previous: Option<AssigneeId>,
        new: AssigneeId,
    },
    StealWindowOpened {
        task_id: TaskId,
    },
}

impl DomainEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            DomainEvent::StateChanged { task_id, .. }
            | DomainEvent::Approved { task_id, .. }
            | DomainEvent::Missed { task_id, .. }
            | DomainEvent::RotationAdvanced { task_id, .. }
            | DomainEvent::StealWindowOpened { task_id } => *task_id,
        }
    }

    /// Short name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::StateChanged { .. } => "state_changed",
            DomainEvent::Approved { .. } => "approved",
            DomainEvent::Missed { .. } => "missed",
            DomainEvent::RotationAdvanced { .. } => "rotation_advanced",
            DomainEvent::StealWindowOpened { .. } => "steal_window_opened",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = DomainEvent::StealWindowOpened {
            task_id: TaskId::from_ulid(Ulid(1)),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "steal_window_opened");
        assert_eq!(json["task_id"], Ulid(1).to_string());
    }

    #[test]
    fn state_changed_carries_lock_reason() {
        let event = DomainEvent::StateChanged {
            task_id: TaskId::from_ulid(Ulid(1)),
            assignee_id: AssigneeId::from_ulid(Ulid(2)),
            old: Some(CalculatedState::Due),
            new: CalculatedState::Missed,
            lock_reason: Some(LockReason::Missed),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["old"], "due");
        assert_eq!(json["new"], "missed");
        assert_eq!(json["lock_reason"], "missed");
        assert_eq!(event.kind(), "state_changed");
    }
}
