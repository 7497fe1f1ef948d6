//! Approval of a pending claim, as a pure plan.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::axes::{OverdueAxis, TriggerAxis};
use super::boundary::{Effect, StepPlan, advance_turn};
use super::cycle::RotationHistory;
use super::ids::AssigneeId;
use super::task::TaskSnapshot;

/// Approves `assignee`'s pending claim at `at`; `None` when there is none.
///
/// Under rotation the turn moves from the approver, once per cycle. Multi
/// triggers reopen the assignee right away so the task can be claimed again.
pub fn plan_approval(
    snapshot: &TaskSnapshot,
    assignee: AssigneeId,
    at: DateTime<Utc>,
    history: &HashMap<AssigneeId, RotationHistory>,
) -> Option<StepPlan> {
    if !snapshot.cycle(assignee).has_pending_claim() {
        return None;
    }
    let mut next = snapshot.clone();
    next.cycle_mut(assignee).approve(at);

    let mut history = history.clone();
    history.entry(assignee).or_default().record(at);

    let mut effects = vec![Effect::Approved {
        assignee,
        effective_at: at,
    }];
    effects.extend(advance_turn(&mut next, Some(assignee), &history));

    if next.definition().trigger.allows_multiple_approvals() {
        next.cycle_mut(assignee).reopen();
    }
    Some(StepPlan {
        next,
        effects,
        held: false,
    })
}

/// Whether the approval just applied must run the boundary before the lock is released.
pub fn completes_boundary(snapshot: &TaskSnapshot, now: DateTime<Utc>) -> bool {
    if !snapshot.cycle_complete() {
        return false;
    }
    let def = snapshot.definition();
    def.trigger == TriggerAxis::OnApproval
        || (def.overdue == OverdueAxis::ClearImmediateOnLate && def.is_past_due(now))
        || snapshot.record.runtime.held_since.is_some()
}
