//! Boundary sequence as pure functions.
//!
//! A boundary runs three steps in a fixed order (`BoundaryStep::ORDER`).
//! Each `plan_*` function takes the current snapshot and returns the next
//! snapshot plus the side effects to publish. The caller stores `next` with
//! `effects` queued in its runtime outbox, then delivers them. A retried
//! boundary never plans an effect twice: every step is a no-op on the state
//! its own previous run left behind, and undelivered effects wait in the outbox.
//!
//! The due-date crossing (`plan_due_crossing`) and firing detection
//! (`fired_boundary`) live here too; the scanner calls them before the
//! boundary itself.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::axes::{OverdueAxis, PendingClaimAxis, TriggerAxis};
use super::cycle::{AssigneeCycleState, BoundaryKey, BoundaryProgress, RotationHistory};
use super::events::MissedReason;
use super::ids::AssigneeId;
use super::resolver;
use super::rotation;
use super::state::CalculatedState;
use super::task::TaskSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryStep {
    ClaimPolicy,
    OverduePolicy,
    CycleReset,
}

impl BoundaryStep {
    pub const ORDER: [BoundaryStep; 3] = [
        BoundaryStep::ClaimPolicy,
        BoundaryStep::OverduePolicy,
        BoundaryStep::CycleReset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BoundaryStep::ClaimPolicy => "claim_policy",
            BoundaryStep::OverduePolicy => "overdue_policy",
            BoundaryStep::CycleReset => "cycle_reset",
        }
    }
}

/// Side effect produced by a step, delivered after `next` is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    Approved {
        assignee: AssigneeId,
        effective_at: DateTime<Utc>,
    },
    Missed {
        assignee: AssigneeId,
        due_at: DateTime<Utc>,
        reason: MissedReason,
    },
    RotationAdvanced {
        previous: Option<AssigneeId>,
        new: AssigneeId,
    },
    StealWindowOpened,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepPlan {
    pub next: TaskSnapshot,
    pub effects: Vec<Effect>,

    /// The boundary stops here: an overdue `at_due_date` task keeps its cycle.
    pub held: bool,
}

impl StepPlan {
    fn unchanged(snapshot: &TaskSnapshot) -> Self {
        Self {
            next: snapshot.clone(),
            effects: Vec::new(),
            held: false,
        }
    }

    pub fn is_noop(&self, before: &TaskSnapshot) -> bool {
        self.effects.is_empty() && !self.held && self.next == *before
    }
}

/// Runs one step by name.
pub fn plan_step(
    step: BoundaryStep,
    snapshot: &TaskSnapshot,
    progress: BoundaryProgress,
    history: &HashMap<AssigneeId, RotationHistory>,
) -> StepPlan {
    match step {
        BoundaryStep::ClaimPolicy => plan_claim_step(snapshot, history),
        BoundaryStep::OverduePolicy => plan_overdue_step(snapshot, progress, history),
        BoundaryStep::CycleReset => plan_cycle_reset(snapshot, progress),
    }
}

/// Step 1: hold, drop or auto-approve every pending claim.
///
/// Auto-approval is effective at the original claim instant.
pub fn plan_claim_step(
    snapshot: &TaskSnapshot,
    history: &HashMap<AssigneeId, RotationHistory>,
) -> StepPlan {
    let def = snapshot.definition();
    if def.pending_claim == PendingClaimAxis::Hold {
        return StepPlan::unchanged(snapshot);
    }

    let mut next = snapshot.clone();
    let mut effects = Vec::new();
    let mut history = history.clone();

    for assignee in def.assignees.iter().copied() {
        let Some(claimed_at) = snapshot.cycle(assignee).claimed_at else {
            continue;
        };
        match def.pending_claim {
            PendingClaimAxis::Hold => {}
            PendingClaimAxis::Clear => {
                next.cycle_mut(assignee).drop_claim();
            }
            PendingClaimAxis::AutoApprove => {
                next.cycle_mut(assignee).approve(claimed_at);
                history.entry(assignee).or_default().record(claimed_at);
                effects.push(Effect::Approved {
                    assignee,
                    effective_at: claimed_at,
                });
                if let Some(effect) = advance_turn(&mut next, Some(assignee), &history) {
                    effects.push(effect);
                }
            }
        }
    }

    StepPlan {
        next,
        effects,
        held: false,
    }
}

/// Step 2: overdue policy, then rotation advancement when nobody advanced it.
///
/// Evaluated at the boundary instant, so a retry sees the same due date.
pub fn plan_overdue_step(
    snapshot: &TaskSnapshot,
    progress: BoundaryProgress,
    history: &HashMap<AssigneeId, RotationHistory>,
) -> StepPlan {
    if progress.overdue_applied {
        return StepPlan::unchanged(snapshot);
    }

    let def = snapshot.definition();
    let at = progress.at;
    let due_reached = def.due_date.filter(|due| *due <= at);
    let mut next = snapshot.clone();
    let mut effects = Vec::new();

    match (def.overdue, due_reached) {
        (OverdueAxis::ClearAndMarkMissed, Some(due)) => {
            let victims: Vec<AssigneeId> = if def.completion.is_rotation_family() {
                original_holder(snapshot)
                    .filter(|h| snapshot.is_delinquent(*h))
                    .into_iter()
                    .collect()
            } else {
                def.assignees
                    .iter()
                    .copied()
                    .filter(|a| snapshot.is_delinquent(*a))
                    .collect()
            };
            effects.extend(victims.into_iter().map(|assignee| Effect::Missed {
                assignee,
                due_at: due,
                reason: MissedReason::ClearedAtBoundary,
            }));
        }
        (OverdueAxis::AllowSteal, Some(due)) => {
            if let Some(holder) = original_holder(snapshot) {
                let own = snapshot.cycle(holder);
                if !own.completed_this_cycle() && !own.has_pending_claim() {
                    effects.push(Effect::Missed {
                        assignee: holder,
                        due_at: due,
                        reason: MissedReason::TurnForfeited,
                    });
                }
            }
        }
        (OverdueAxis::AtDueDate, Some(_)) if !snapshot.cycle_complete() => {
            let rt = &mut next.record.runtime;
            if rt.held_since.is_none() {
                rt.held_since = Some(at);
            }
            rt.mark_fired(progress.key);
            rt.boundary = None;
            return StepPlan {
                next,
                effects,
                held: true,
            };
        }
        // The lock is lifted by the reset; missed records were written when it engaged.
        _ => {}
    }

    if !next.record.runtime.turn_advanced {
        let anchor = original_holder(snapshot);
        if let Some(effect) = advance_turn(&mut next, anchor, history) {
            effects.push(effect);
        }
    }

    next.record.runtime.boundary = Some(BoundaryProgress {
        overdue_applied: true,
        ..progress
    });
    StepPlan {
        next,
        effects,
        held: false,
    }
}

/// Step 3: clear cycle states, roll the due date, start the next cycle.
pub fn plan_cycle_reset(snapshot: &TaskSnapshot, progress: BoundaryProgress) -> StepPlan {
    let def = snapshot.definition();
    let at = progress.at;
    let mut next = snapshot.clone();

    let hold = def.pending_claim == PendingClaimAxis::Hold;
    next.cycles = snapshot
        .cycles
        .iter()
        .filter_map(|(assignee, state)| {
            let kept = state.claimed_at.filter(|_| hold)?;
            Some((
                *assignee,
                AssigneeCycleState {
                    claimed_at: Some(kept),
                    ..AssigneeCycleState::EMPTY
                },
            ))
        })
        .collect();

    let next_def = &mut next.record.definition;
    if let Some(due) = next_def.due_date
        && due <= at
    {
        next_def.due_date = next_def.recurrence.advance(due, at);
    }
    next_def.rotation.override_active = false;
    let holder = next_def.turn_holder();

    let rt = &mut next.record.runtime;
    rt.start_cycle(at, holder);
    rt.mark_fired(progress.key);

    StepPlan {
        next,
        effects: Vec::new(),
        held: false,
    }
}

/// Applies the due-date crossing once per cycle.
///
/// Opens the steal window and records missed for assignees locked out by
/// `mark_missed_and_lock`. Calling it again at the same instant changes nothing.
pub fn plan_due_crossing(snapshot: &TaskSnapshot, now: DateTime<Utc>) -> StepPlan {
    let def = snapshot.definition();
    let rt = &snapshot.record.runtime;
    let Some(due) = def.due_date else {
        return StepPlan::unchanged(snapshot);
    };
    if now <= due || !def.overdue.tracks_overdue() || rt.overdue_since.is_some() {
        return StepPlan::unchanged(snapshot);
    }

    let mut next = snapshot.clone();
    let mut effects = Vec::new();
    next.record.runtime.overdue_since = Some(due);

    match def.overdue {
        OverdueAxis::AllowSteal => {
            next.record.runtime.steal_window_open = true;
            effects.push(Effect::StealWindowOpened);
        }
        OverdueAxis::MarkMissedAndLock => {
            for assignee in def.assignees.iter().copied() {
                let locked = resolver::resolve(def, assignee, now, snapshot.cycle(assignee)).state()
                    == CalculatedState::Missed;
                if locked
                    && snapshot.is_delinquent(assignee)
                    && !rt.missed_marked.contains(&assignee)
                {
                    next.record.runtime.missed_marked.push(assignee);
                    effects.push(Effect::Missed {
                        assignee,
                        due_at: due,
                        reason: MissedReason::LockedPastDue,
                    });
                }
            }
        }
        _ => {}
    }

    StepPlan {
        next,
        effects,
        held: false,
    }
}

/// Which automatic boundary, if any, has fired and not yet been processed.
///
/// An interrupted boundary always wins so retries keep their original instant.
pub fn fired_boundary(
    snapshot: &TaskSnapshot,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<BoundaryProgress> {
    let rt = &snapshot.record.runtime;
    if let Some(progress) = rt.boundary {
        return Some(progress);
    }

    let def = snapshot.definition();
    match def.trigger {
        TriggerAxis::MidnightOnce | TriggerAxis::MidnightMulti => {
            let today = local_day(now, offset);
            if rt.last_fired_day.is_some_and(|last| today <= last) {
                return None;
            }
            let at = local_midnight(today, offset)?;
            Some(BoundaryProgress::new(BoundaryKey::LocalDay(today), at))
        }
        TriggerAxis::DueDateOnce | TriggerAxis::DueDateMulti => {
            let due = def.due_date?;
            if now <= due || rt.last_fired_due == Some(due) {
                return None;
            }
            Some(BoundaryProgress::new(BoundaryKey::DueDate(due), due))
        }
        TriggerAxis::OnApproval | TriggerAxis::Manual => None,
    }
}

pub fn local_day(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

pub fn local_midnight(day: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&day.and_time(NaiveTime::MIN))
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// Holder at the start of the cycle, falling back to the current holder.
fn original_holder(snapshot: &TaskSnapshot) -> Option<AssigneeId> {
    let def = snapshot.definition();
    if !def.completion.is_rotation_family() {
        return None;
    }
    let anchor = snapshot.record.runtime.cycle_turn_holder.or(def.rotation.turn);
    rotation::effective_holder(&def.assignees, anchor)
}

/// Moves the turn once per cycle, anchored at `anchor`.
pub(crate) fn advance_turn(
    snapshot: &mut TaskSnapshot,
    anchor: Option<AssigneeId>,
    history: &HashMap<AssigneeId, RotationHistory>,
) -> Option<Effect> {
    let def = &mut snapshot.record.definition;
    if !def.completion.is_rotation_family() || snapshot.record.runtime.turn_advanced {
        return None;
    }
    let new = rotation::next_holder(def.completion, &def.assignees, anchor, history)?;
    let previous = def.rotation.turn;
    def.rotation.turn = Some(new);
    snapshot.record.runtime.turn_advanced = true;
    Some(Effect::RotationAdvanced { previous, new })
}
