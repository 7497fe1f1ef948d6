//! ClaimGate: may this assignee claim the task right now?
//!
//! The resolver decides whether the assignee is locked out; the completion
//! mode then decides whether somebody else's claim or completion already
//! covers the cycle. First-wins and both rotation modes share
//! `single_claimer_conflict`.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cycle::AssigneeCycleState;
use super::ids::AssigneeId;
use super::resolver;
use super::state::{CalculatedState, LockReason};
use super::task::TaskDefinition;

/// Why a claim was refused. Refusals are ordinary results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "by", rename_all = "snake_case")]
pub enum DenyReason {
    NotAssigned,
    Locked(LockReason),
    AlreadyClaimed,
    AlreadyApproved,
    ClaimedByOther(AssigneeId),
    CompletedByOther(AssigneeId),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NotAssigned => f.write_str("not_assigned"),
            DenyReason::Locked(reason) => f.write_str(reason.as_str()),
            DenyReason::AlreadyClaimed => f.write_str("already_claimed"),
            DenyReason::AlreadyApproved => f.write_str("already_approved"),
            DenyReason::ClaimedByOther(by) => write!(f, "claimed_by_other ({by})"),
            DenyReason::CompletedByOther(by) => write!(f, "completed_by_other ({by})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ClaimDecision {
    Allowed,
    Denied(DenyReason),
}

impl ClaimDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ClaimDecision::Allowed)
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            ClaimDecision::Allowed => None,
            ClaimDecision::Denied(reason) => Some(*reason),
        }
    }
}

pub fn can_claim(
    task: &TaskDefinition,
    assignee: AssigneeId,
    now: DateTime<Utc>,
    cycles: &HashMap<AssigneeId, AssigneeCycleState>,
) -> ClaimDecision {
    if !task.is_assigned(assignee) {
        return ClaimDecision::Denied(DenyReason::NotAssigned);
    }

    let own = cycles.get(&assignee).unwrap_or(&AssigneeCycleState::EMPTY);
    let resolution = resolver::resolve(task, assignee, now, own);
    if let Some(reason) = resolution.lock_reason() {
        return ClaimDecision::Denied(DenyReason::Locked(reason));
    }
    match resolution.state() {
        CalculatedState::Approved => return ClaimDecision::Denied(DenyReason::AlreadyApproved),
        CalculatedState::Claimed => return ClaimDecision::Denied(DenyReason::AlreadyClaimed),
        _ => {}
    }

    if task.completion.is_single_claimer_family()
        && let Some(reason) = single_claimer_conflict(task, assignee, cycles)
    {
        return ClaimDecision::Denied(reason);
    }
    ClaimDecision::Allowed
}

/// Someone else already holds this cycle: a pending claim, or a completion.
fn single_claimer_conflict(
    task: &TaskDefinition,
    assignee: AssigneeId,
    cycles: &HashMap<AssigneeId, AssigneeCycleState>,
) -> Option<DenyReason> {
    let others = task.assignees.iter().filter(|a| **a != assignee);
    for other in others {
        let Some(state) = cycles.get(other) else {
            continue;
        };
        if state.has_pending_claim() {
            return Some(DenyReason::ClaimedByOther(*other));
        }
        if state.completed_this_cycle() {
            return Some(DenyReason::CompletedByOther(*other));
        }
    }
    None
}
