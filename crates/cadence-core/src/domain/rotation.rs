//! Rotation selection: who holds the turn next, and how the pointer reacts
//! to completion-mode edits.
//!
//! Everything here is a pure function over plain values. Both selectors share
//! one resilience rule: a holder that is no longer in the assignee list is
//! treated as the list head.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::axes::CompletionMode;
use super::cycle::RotationHistory;
use super::errors::ConfigError;
use super::ids::AssigneeId;
use super::task::{RotationPointer, TaskDefinition};

/// Holder after the dangling-pointer fallback; `None` only for an empty list.
pub fn effective_holder(
    assignees: &[AssigneeId],
    current: Option<AssigneeId>,
) -> Option<AssigneeId> {
    match current {
        Some(c) if assignees.contains(&c) => Some(c),
        _ => assignees.first().copied(),
    }
}

/// `assignees[(index_of(current) + 1) % len]`.
pub fn next_round_robin(
    assignees: &[AssigneeId],
    current: Option<AssigneeId>,
) -> Option<AssigneeId> {
    let holder = effective_holder(assignees, current)?;
    let index = assignees.iter().position(|a| *a == holder)?;
    Some(assignees[(index + 1) % assignees.len()])
}

/// Least-approved assignee first; ties by oldest last approval (never approved
/// counts as oldest), then by list position.
pub fn next_fairness(
    assignees: &[AssigneeId],
    history: &HashMap<AssigneeId, RotationHistory>,
) -> Option<AssigneeId> {
    let key = |position: usize, a: &AssigneeId| {
        let h = history.get(a).copied().unwrap_or_default();
        // None < Some(_) gives "unset counts as earliest" for free.
        let last: Option<DateTime<Utc>> = h.last_approved_at;
        (h.approved_count, last, position)
    };
    assignees
        .iter()
        .enumerate()
        .min_by_key(|(position, a)| key(*position, *a))
        .map(|(_, a)| *a)
}

/// Next holder for a rotation task, anchored at `anchor` (completer or original holder).
pub fn next_holder(
    mode: CompletionMode,
    assignees: &[AssigneeId],
    anchor: Option<AssigneeId>,
    history: &HashMap<AssigneeId, RotationHistory>,
) -> Option<AssigneeId> {
    match mode {
        CompletionMode::RotationFairness => next_fairness(assignees, history),
        _ => next_round_robin(assignees, anchor),
    }
}

/// How the turn pointer changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPatch {
    Keep,
    Set(AssigneeId),
    Clear,
}

/// Field patch produced by a completion-mode edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPatch {
    pub turn: TurnPatch,
    /// `Some(false)` clears the override; `None` leaves it alone.
    pub override_active: Option<bool>,
}

impl RotationPatch {
    pub const NONE: RotationPatch = RotationPatch {
        turn: TurnPatch::Keep,
        override_active: None,
    };

    pub fn apply(&self, pointer: &mut RotationPointer) {
        match self.turn {
            TurnPatch::Keep => {}
            TurnPatch::Set(a) => pointer.turn = Some(a),
            TurnPatch::Clear => pointer.turn = None,
        }
        if let Some(active) = self.override_active {
            pointer.override_active = active;
        }
    }
}

/// Patch for the rotation fields when a task moves from `old` to `new` mode.
pub fn transition_actions(
    old: CompletionMode,
    new: CompletionMode,
    task: &TaskDefinition,
) -> Result<RotationPatch, ConfigError> {
    match (old.is_rotation_family(), new.is_rotation_family()) {
        (false, true) => {
            if task.assignees.len() < 2 {
                return Err(ConfigError::TooFewAssignees {
                    mode: new,
                    count: task.assignees.len(),
                });
            }
            Ok(RotationPatch {
                turn: TurnPatch::Set(task.assignees[0]),
                override_active: Some(false),
            })
        }
        (true, false) => Ok(RotationPatch {
            turn: TurnPatch::Clear,
            override_active: Some(false),
        }),
        (true, true) | (false, false) => Ok(RotationPatch::NONE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::TaskId;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use ulid::Ulid;

    fn people(n: usize) -> Vec<AssigneeId> {
        (0..n)
            .map(|i| AssigneeId::from_ulid(Ulid(i as u128 + 1)))
            .collect()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn round_robin_wraps() {
        let p = people(3);
        assert_eq!(next_round_robin(&p, Some(p[0])), Some(p[1]));
        assert_eq!(next_round_robin(&p, Some(p[2])), Some(p[0]));
    }

    #[test]
    fn missing_holder_falls_back_to_head() {
        let p = people(3);
        let gone = AssigneeId::from_ulid(Ulid(999));
        assert_eq!(effective_holder(&p, Some(gone)), Some(p[0]));
        assert_eq!(next_round_robin(&p, Some(gone)), Some(p[1]));
        assert_eq!(next_round_robin(&p, None), Some(p[1]));
    }

    #[test]
    fn empty_list_has_no_holder() {
        assert_eq!(next_round_robin(&[], None), None);
        assert_eq!(next_fairness(&[], &HashMap::new()), None);
    }

    fn served(approved_count: u64, last: DateTime<Utc>) -> RotationHistory {
        RotationHistory {
            approved_count,
            last_approved_at: Some(last),
        }
    }

    #[test]
    fn fairness_prefers_lowest_count_then_oldest() {
        let p = people(3);
        let history = HashMap::from([
            (p[0], served(5, t0())),
            (p[1], served(3, t0() - Duration::days(3))),
            (p[2], served(3, t0() - Duration::days(1))),
        ]);
        assert_eq!(next_fairness(&p, &history), Some(p[1]));
    }

    #[test]
    fn fairness_treats_never_approved_as_earliest() {
        let p = people(2);
        let history = HashMap::from([(p[0], served(0, t0()))]);
        assert_eq!(next_fairness(&p, &history), Some(p[1]));
    }

    fn task_with(n: usize) -> TaskDefinition {
        TaskDefinition::new(TaskId::from_ulid(Ulid(7)), "trash", people(n))
    }

    #[test]
    fn entering_rotation_points_at_head() {
        let task = task_with(3);
        let patch =
            transition_actions(CompletionMode::FirstWins, CompletionMode::RotationFairness, &task)
                .unwrap();
        assert_eq!(patch.turn, TurnPatch::Set(task.assignees[0]));
        assert_eq!(patch.override_active, Some(false));
    }

    #[test]
    fn entering_rotation_with_one_assignee_fails() {
        let task = task_with(1);
        let err = transition_actions(
            CompletionMode::Independent,
            CompletionMode::RotationRoundRobin,
            &task,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::TooFewAssignees { count: 1, .. }));
    }

    #[test]
    fn leaving_rotation_clears_pointer_and_override() {
        let mut task = task_with(2);
        task.rotation = RotationPointer {
            turn: Some(task.assignees[1]),
            override_active: true,
        };
        let patch = transition_actions(
            CompletionMode::RotationRoundRobin,
            CompletionMode::AllRequired,
            &task,
        )
        .unwrap();
        patch.apply(&mut task.rotation);
        assert_eq!(task.rotation, RotationPointer::default());
    }

    #[test]
    fn switching_between_rotation_modes_keeps_pointer() {
        let mut task = task_with(3);
        task.rotation.turn = Some(task.assignees[2]);
        let patch = transition_actions(
            CompletionMode::RotationRoundRobin,
            CompletionMode::RotationFairness,
            &task,
        )
        .unwrap();
        assert_eq!(patch, RotationPatch::NONE);
        patch.apply(&mut task.rotation);
        assert_eq!(task.rotation.turn, Some(task.assignees[2]));
    }

    proptest! {
        #[test]
        fn round_robin_is_cyclic(len in 1usize..12, start in 0usize..12) {
            let p = people(len);
            let start = p[start % len];
            let mut current = start;
            for _ in 0..len {
                current = next_round_robin(&p, Some(current)).unwrap();
            }
            prop_assert_eq!(current, start);
        }

        #[test]
        fn fairness_never_prefers_higher_count(
            entries in prop::collection::vec((0u64..6, prop::option::of(0i64..5)), 1..8)
        ) {
            let p = people(entries.len());
            let history: HashMap<_, _> = p.iter().zip(&entries).map(|(a, (count, hours))| {
                (*a, RotationHistory {
                    approved_count: *count,
                    last_approved_at: hours.map(|h| t0() + Duration::hours(h)),
                })
            }).collect();

            let chosen = next_fairness(&p, &history).unwrap();
            let pos = p.iter().position(|a| *a == chosen).unwrap();
            let (count, last) = entries[pos];
            for (i, (other_count, other_last)) in entries.iter().enumerate() {
                prop_assert!(count <= *other_count);
                if *other_count == count {
                    prop_assert!(last <= *other_last);
                    if *other_last == last {
                        prop_assert!(pos <= i);
                    }
                }
            }
        }
    }
}
