//! StateResolver: task + instant + cycle flags → visible state.
//!
//! Tiers are evaluated in descending priority and the first match wins:
//!
//! | tier | state        | condition                                                   |
//! |------|--------------|-------------------------------------------------------------|
//! | 1    | approved     | approved this cycle                                         |
//! | 2    | claimed      | pending claim                                               |
//! | 3    | not_my_turn  | rotation, not holder, no override, steal window closed      |
//! | 4    | missed       | mark_missed_and_lock and past due                           |
//! | 5    | overdue      | overdue tracked and past due                                |
//! | 6    | waiting      | before the claim window opens                               |
//! | 7    | due          | inside the window, or a due date without a window          |
//! | 8    | pending      | otherwise                                                   |

use chrono::{DateTime, Utc};

use super::axes::OverdueAxis;
use super::cycle::AssigneeCycleState;
use super::ids::AssigneeId;
use super::state::{CalculatedState, Resolution};
use super::task::TaskDefinition;

/// Resolves the state of `task` for `assignee` at `now`.
pub fn resolve(
    task: &TaskDefinition,
    assignee: AssigneeId,
    now: DateTime<Utc>,
    cycle: &AssigneeCycleState,
) -> Resolution {
    Resolution::of(tier(task, assignee, now, cycle))
}

fn tier(
    task: &TaskDefinition,
    assignee: AssigneeId,
    now: DateTime<Utc>,
    cycle: &AssigneeCycleState,
) -> CalculatedState {
    if cycle.is_approved_this_cycle() {
        return CalculatedState::Approved;
    }
    if cycle.has_pending_claim() {
        return CalculatedState::Claimed;
    }
    if is_blocked_by_turn(task, assignee, now) {
        return CalculatedState::NotMyTurn;
    }

    let past_due = task.is_past_due(now);
    if past_due && task.overdue == OverdueAxis::MarkMissedAndLock {
        return CalculatedState::Missed;
    }
    if past_due && task.overdue.tracks_overdue() {
        return CalculatedState::Overdue;
    }

    match (task.due_date, task.window_start()) {
        (Some(_), Some(opens)) if now < opens => CalculatedState::Waiting,
        (Some(due), Some(opens)) if opens <= now && now <= due => CalculatedState::Due,
        (Some(_), None) => CalculatedState::Due,
        _ => CalculatedState::Pending,
    }
}

/// Tier 3. Override and steal window both unblock; either is enough.
pub fn is_blocked_by_turn(task: &TaskDefinition, assignee: AssigneeId, now: DateTime<Utc>) -> bool {
    if !task.completion.is_rotation_family() {
        return false;
    }
    if task.rotation.override_active || task.steal_active(now) {
        return false;
    }
    task.turn_holder() != Some(assignee)
}
