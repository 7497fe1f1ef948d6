//! Configuration-time validation.
//!
//! Every trigger × overdue combination is listed once in `COMPATIBILITY`.
//! Definitions that pass `validate` are assumed valid by the resolver and the
//! boundary sequence, which therefore carry no branches for impossible inputs.
//!
//! Stored definitions are rechecked on load with the narrower `check_stored`.
//! A reset may legitimately leave a definition that `validate` would refuse
//! (a one-off `allow_steal` task loses its due date), so only the structure the
//! runtime indexes on is enforced there.

use std::collections::HashSet;

use chrono::Duration;

use super::axes::{OverdueAxis, TriggerAxis};
use super::errors::ConfigError;
use super::task::TaskDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Ok,
    No(&'static str),
}

use Cell::{No, Ok as Y};

const NO_RESET_WHILE_OVERDUE: &str = "no boundary fires while the task is overdue";
const LOCK_NEEDS_MIDNIGHT: &str = "the lock is released by a midnight boundary";
const STEAL_NEEDS_MIDNIGHT_ONCE: &str =
    "the steal window closes at a once-per-day midnight boundary";

/// Rows follow `OverdueAxis::ALL`, columns follow `TriggerAxis::ALL`:
/// midnight_once, midnight_multi, due_date_once, due_date_multi, on_approval, manual.
const COMPATIBILITY: [[Cell; 6]; 7] = [
    // never
    [Y, Y, Y, Y, Y, Y],
    // at_due_date
    [Y, Y, Y, Y, Y, Y],
    // clear_at_reset
    [Y, Y, Y, Y, No(NO_RESET_WHILE_OVERDUE), Y],
    // clear_immediate_on_late
    [Y, Y, Y, Y, Y, Y],
    // clear_and_mark_missed
    [Y, Y, Y, Y, No(NO_RESET_WHILE_OVERDUE), Y],
    // mark_missed_and_lock
    [
        Y,
        Y,
        No(LOCK_NEEDS_MIDNIGHT),
        No(LOCK_NEEDS_MIDNIGHT),
        No(LOCK_NEEDS_MIDNIGHT),
        No(LOCK_NEEDS_MIDNIGHT),
    ],
    // allow_steal
    [
        Y,
        No(STEAL_NEEDS_MIDNIGHT_ONCE),
        No(STEAL_NEEDS_MIDNIGHT_ONCE),
        No(STEAL_NEEDS_MIDNIGHT_ONCE),
        No(STEAL_NEEDS_MIDNIGHT_ONCE),
        No(STEAL_NEEDS_MIDNIGHT_ONCE),
    ],
];

/// Checks a trigger/overdue pair against the static table.
pub fn check_axes(trigger: TriggerAxis, overdue: OverdueAxis) -> Result<(), ConfigError> {
    match COMPATIBILITY[overdue.index()][trigger.index()] {
        Cell::Ok => Ok(()),
        Cell::No(reason) => Err(ConfigError::IncompatibleAxes {
            trigger,
            overdue,
            reason,
        }),
    }
}

/// Rejects definitions the runtime must never see.
pub fn validate(def: &TaskDefinition) -> Result<(), ConfigError> {
    if def.name.trim().is_empty() {
        return Err(ConfigError::EmptyName);
    }
    if !def.points.is_finite() || def.points < 0.0 {
        return Err(ConfigError::InvalidPoints);
    }
    check_stored(def)?;
    if let Some(window) = def.due_window {
        if window <= Duration::zero() {
            return Err(ConfigError::NonPositiveWindow);
        }
        if def.due_date.is_some_and(|due| due.checked_sub_signed(window).is_none()) {
            return Err(ConfigError::WindowOutOfRange);
        }
    }

    let mode = def.completion;
    if mode.is_rotation_family() && def.trigger.allows_multiple_approvals() {
        return Err(ConfigError::RotationWithMultiTrigger(def.trigger));
    }

    check_axes(def.trigger, def.overdue)?;

    if def.overdue == OverdueAxis::AllowSteal {
        if !mode.is_rotation_family() {
            return Err(ConfigError::RequiresRotation {
                overdue: def.overdue,
                mode,
            });
        }
        if def.due_date.is_none() {
            return Err(ConfigError::RequiresDueDate {
                overdue: def.overdue,
            });
        }
    }
    Ok(())
}

/// Invariants a stored definition keeps for its whole life: a non-empty
/// assignee list without duplicates, and two or more people in a rotation.
pub fn check_stored(def: &TaskDefinition) -> Result<(), ConfigError> {
    if def.assignees.is_empty() {
        return Err(ConfigError::NoAssignees);
    }
    let mut seen = HashSet::with_capacity(def.assignees.len());
    for a in &def.assignees {
        if !seen.insert(*a) {
            return Err(ConfigError::DuplicateAssignee(*a));
        }
    }
    let mode = def.completion;
    if mode.is_rotation_family() && def.assignees.len() < 2 {
        return Err(ConfigError::TooFewAssignees {
            mode,
            count: def.assignees.len(),
        });
    }
    Ok(())
}

/// Validates and brings the rotation pointer in line with the completion mode.
pub fn normalize(mut def: TaskDefinition) -> Result<TaskDefinition, ConfigError> {
    validate(&def)?;
    if def.completion.is_rotation_family() {
        def.rotation.turn = def.turn_holder();
    } else {
        def.rotation = Default::default();
    }
    Ok(def)
}
