//! Configuration axes of a recurring task.
//!
//! Each axis is a closed enum. Call sites ask the derived predicates
//! (`is_rotation_family`, `is_midnight`, ...) instead of comparing variants,
//! so adding a variant only touches this file and the compatibility table in
//! `validation`.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// When the cycle boundary fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAxis {
    MidnightOnce,
    MidnightMulti,
    DueDateOnce,
    DueDateMulti,
    OnApproval,
    Manual,
}

impl TriggerAxis {
    pub const ALL: [TriggerAxis; 6] = [
        TriggerAxis::MidnightOnce,
        TriggerAxis::MidnightMulti,
        TriggerAxis::DueDateOnce,
        TriggerAxis::DueDateMulti,
        TriggerAxis::OnApproval,
        TriggerAxis::Manual,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub fn is_midnight(self) -> bool {
        matches!(self, TriggerAxis::MidnightOnce | TriggerAxis::MidnightMulti)
    }

    pub fn is_due_date(self) -> bool {
        matches!(self, TriggerAxis::DueDateOnce | TriggerAxis::DueDateMulti)
    }

    /// Multi variants reopen an assignee's cycle state right after each approval.
    pub fn allows_multiple_approvals(self) -> bool {
        matches!(self, TriggerAxis::MidnightMulti | TriggerAxis::DueDateMulti)
    }

    /// Whether the scanner is responsible for detecting this trigger.
    pub fn is_scanned(self) -> bool {
        self.is_midnight() || self.is_due_date()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerAxis::MidnightOnce => "midnight_once",
            TriggerAxis::MidnightMulti => "midnight_multi",
            TriggerAxis::DueDateOnce => "due_date_once",
            TriggerAxis::DueDateMulti => "due_date_multi",
            TriggerAxis::OnApproval => "on_approval",
            TriggerAxis::Manual => "manual",
        }
    }
}

/// What happens to a task that passes its due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverdueAxis {
    Never,
    AtDueDate,
    ClearAtReset,
    ClearImmediateOnLate,
    ClearAndMarkMissed,
    MarkMissedAndLock,
    AllowSteal,
}

impl OverdueAxis {
    pub const ALL: [OverdueAxis; 7] = [
        OverdueAxis::Never,
        OverdueAxis::AtDueDate,
        OverdueAxis::ClearAtReset,
        OverdueAxis::ClearImmediateOnLate,
        OverdueAxis::ClearAndMarkMissed,
        OverdueAxis::MarkMissedAndLock,
        OverdueAxis::AllowSteal,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Whether passing the due date changes the visible state at all.
    pub fn tracks_overdue(self) -> bool {
        !matches!(self, OverdueAxis::Never)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverdueAxis::Never => "never",
            OverdueAxis::AtDueDate => "at_due_date",
            OverdueAxis::ClearAtReset => "clear_at_reset",
            OverdueAxis::ClearImmediateOnLate => "clear_immediate_on_late",
            OverdueAxis::ClearAndMarkMissed => "clear_and_mark_missed",
            OverdueAxis::MarkMissedAndLock => "mark_missed_and_lock",
            OverdueAxis::AllowSteal => "allow_steal",
        }
    }
}

/// What happens to an unapproved claim when the boundary fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingClaimAxis {
    #[default]
    Hold,
    Clear,
    AutoApprove,
}

/// How the assignees of a task share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Every assignee has their own copy of the task.
    #[default]
    Independent,
    /// The first assignee to claim takes it for everyone.
    FirstWins,
    /// Every assignee must complete it.
    AllRequired,
    RotationRoundRobin,
    RotationFairness,
}

impl CompletionMode {
    /// Only one assignee may hold an active claim or completion per cycle.
    pub fn is_single_claimer_family(self) -> bool {
        matches!(
            self,
            CompletionMode::FirstWins
                | CompletionMode::RotationRoundRobin
                | CompletionMode::RotationFairness
        )
    }

    pub fn is_rotation_family(self) -> bool {
        matches!(
            self,
            CompletionMode::RotationRoundRobin | CompletionMode::RotationFairness
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompletionMode::Independent => "independent",
            CompletionMode::FirstWins => "first_wins",
            CompletionMode::AllRequired => "all_required",
            CompletionMode::RotationRoundRobin => "rotation_round_robin",
            CompletionMode::RotationFairness => "rotation_fairness",
        }
    }
}

/// How a passed due date moves forward at the cycle reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "every", rename_all = "snake_case")]
pub enum Recurrence {
    /// The due date is dropped once it has passed.
    #[default]
    None,
    Daily,
    Weekly,
    Days { count: u16 },
}

impl Recurrence {
    fn period(self) -> Option<Duration> {
        match self {
            Recurrence::None => None,
            Recurrence::Daily => Some(Duration::days(1)),
            Recurrence::Weekly => Some(Duration::weeks(1)),
            Recurrence::Days { count } => Some(Duration::days(i64::from(count.max(1)))),
        }
    }

    /// Next due date strictly after `boundary`, or `None` for one-off tasks.
    pub fn advance(self, due: DateTime<Utc>, boundary: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let period = self.period()?;
        if due > boundary {
            return Some(due);
        }
        // Skip whole periods at once so a long outage does not loop per day.
        let behind = boundary - due;
        let steps = i32::try_from(behind.num_seconds() / period.num_seconds() + 1).ok()?;
        due.checked_add_signed(period.checked_mul(steps)?)
    }
}

macro_rules! display_via_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_via_as_str!(TriggerAxis, OverdueAxis, CompletionMode);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rotation_modes_are_single_claimers() {
        for mode in [
            CompletionMode::RotationRoundRobin,
            CompletionMode::RotationFairness,
        ] {
            assert!(mode.is_rotation_family());
            assert!(mode.is_single_claimer_family());
        }
        assert!(CompletionMode::FirstWins.is_single_claimer_family());
        assert!(!CompletionMode::FirstWins.is_rotation_family());
        assert!(!CompletionMode::AllRequired.is_single_claimer_family());
        assert!(!CompletionMode::Independent.is_single_claimer_family());
    }

    #[test]
    fn axis_indexes_match_all_tables() {
        for (i, t) in TriggerAxis::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
        for (i, o) in OverdueAxis::ALL.iter().enumerate() {
            assert_eq!(o.index(), i);
        }
    }

    #[test]
    fn axes_deserialize_from_snake_case() {
        let t: TriggerAxis = serde_json::from_str("\"due_date_multi\"").unwrap();
        assert_eq!(t, TriggerAxis::DueDateMulti);
        let o: OverdueAxis = serde_json::from_str("\"allow_steal\"").unwrap();
        assert_eq!(o, OverdueAxis::AllowSteal);
        let r: Recurrence = serde_json::from_str(r#"{"every":"days","count":3}"#).unwrap();
        assert_eq!(r, Recurrence::Days { count: 3 });
    }

    #[test]
    fn recurrence_skips_to_first_date_after_boundary() {
        let due = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();
        let boundary = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();

        assert_eq!(
            Recurrence::Daily.advance(due, boundary),
            Some(Utc.with_ymd_and_hms(2026, 3, 5, 18, 0, 0).unwrap())
        );
        assert_eq!(
            Recurrence::Weekly.advance(due, boundary),
            Some(Utc.with_ymd_and_hms(2026, 3, 9, 18, 0, 0).unwrap())
        );
        assert_eq!(Recurrence::None.advance(due, boundary), None);
    }

    #[test]
    fn recurrence_moves_due_date_sitting_exactly_on_boundary() {
        let due = Utc.with_ymd_and_hms(2026, 3, 2, 18, 0, 0).unwrap();
        assert_eq!(
            Recurrence::Daily.advance(due, due),
            Some(Utc.with_ymd_and_hms(2026, 3, 3, 18, 0, 0).unwrap())
        );
    }

    #[test]
    fn recurrence_keeps_future_due_date() {
        let due = Utc.with_ymd_and_hms(2026, 3, 9, 18, 0, 0).unwrap();
        let boundary = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        assert_eq!(Recurrence::Daily.advance(due, boundary), Some(due));
    }
}
