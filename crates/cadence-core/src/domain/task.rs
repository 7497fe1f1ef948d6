//! Task definition and the per-task record handled by the engine.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use super::axes::{CompletionMode, OverdueAxis, PendingClaimAxis, Recurrence, TriggerAxis};
use super::cycle::{AssigneeCycleState, CycleRuntime};
use super::ids::{AssigneeId, TaskId};
use super::rotation;

/// Rotation turn pointer and its transient override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationPointer {
    /// Current turn-holder. Stored by id; may name a removed assignee.
    pub turn: Option<AssigneeId>,

    /// While set, any assignee may claim regardless of turn. Cleared every cycle.
    pub override_active: bool,
}

/// A recurring task as configured externally.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub name: String,
    pub points: f64,
    pub trigger: TriggerAxis,
    pub overdue: OverdueAxis,
    pub pending_claim: PendingClaimAxis,
    pub due_date: Option<DateTime<Utc>>,

    /// Claims open this long before the due date; `None` means always open.
    pub due_window: Option<Duration>,

    pub recurrence: Recurrence,

    /// Ordered; the head is the default turn-holder.
    pub assignees: Vec<AssigneeId>,

    pub completion: CompletionMode,
    pub rotation: RotationPointer,
}

impl TaskDefinition {
    /// Minimal definition: independent, midnight-once, never overdue, hold claims.
    pub fn new(id: TaskId, name: impl Into<String>, assignees: Vec<AssigneeId>) -> Self {
        Self {
            id,
            name: name.into(),
            points: 0.0,
            trigger: TriggerAxis::MidnightOnce,
            overdue: OverdueAxis::Never,
            pending_claim: PendingClaimAxis::Hold,
            due_date: None,
            due_window: None,
            recurrence: Recurrence::None,
            assignees,
            completion: CompletionMode::Independent,
            rotation: RotationPointer::default(),
        }
    }

    pub fn is_assigned(&self, assignee: AssigneeId) -> bool {
        self.assignees.contains(&assignee)
    }

    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.due_date.is_some_and(|due| now > due)
    }

    /// Start of the claim window, when both a due date and a window exist.
    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.due_date?.checked_sub_signed(self.due_window?)
    }

    /// Turn-holder after applying the dangling-pointer fallback.
    pub fn turn_holder(&self) -> Option<AssigneeId> {
        if !self.completion.is_rotation_family() {
            return None;
        }
        rotation::effective_holder(&self.assignees, self.rotation.turn)
    }

    /// Whether the steal window is open at `now`.
    pub fn steal_active(&self, now: DateTime<Utc>) -> bool {
        self.overdue == OverdueAxis::AllowSteal && self.is_past_due(now)
    }
}

/// Definition plus runtime markers; the unit persisted by `TaskStore::put_task`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub definition: TaskDefinition,
    pub runtime: CycleRuntime,
}

impl TaskRecord {
    pub fn new(definition: TaskDefinition, runtime: CycleRuntime) -> Self {
        Self {
            definition,
            runtime,
        }
    }

    pub fn id(&self) -> TaskId {
        self.definition.id
    }
}

/// Everything needed to evaluate one task: record plus cycle states.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub record: TaskRecord,
    pub cycles: HashMap<AssigneeId, AssigneeCycleState>,
}

impl TaskSnapshot {
    pub fn new(record: TaskRecord) -> Self {
        Self {
            record,
            cycles: HashMap::new(),
        }
    }

    pub fn definition(&self) -> &TaskDefinition {
        &self.record.definition
    }

    pub fn cycle(&self, assignee: AssigneeId) -> &AssigneeCycleState {
        self.cycles
            .get(&assignee)
            .unwrap_or(&AssigneeCycleState::EMPTY)
    }

    pub fn cycle_mut(&mut self, assignee: AssigneeId) -> &mut AssigneeCycleState {
        self.cycles.entry(assignee).or_default()
    }

    /// Assignees (in list order) that completed at least once this cycle.
    pub fn completers(&self) -> Vec<AssigneeId> {
        self.record
            .definition
            .assignees
            .iter()
            .copied()
            .filter(|a| self.cycle(*a).completed_this_cycle())
            .collect()
    }

    /// Whether the task counts as done for this cycle under its completion mode.
    pub fn cycle_complete(&self) -> bool {
        let def = &self.record.definition;
        let done = |a: &AssigneeId| self.cycle(*a).completed_this_cycle();
        let any_completes = def.completion.is_single_claimer_family()
            || def.completion == CompletionMode::Independent;
        if any_completes {
            def.assignees.iter().any(done)
        } else {
            def.assignees.iter().all(done)
        }
    }

    /// Whether `assignee` still owes this cycle's completion.
    ///
    /// A pending claim counts as done: the assignee acted and only approval is missing.
    pub fn is_delinquent(&self, assignee: AssigneeId) -> bool {
        let def = &self.record.definition;
        let own = self.cycle(assignee);
        if own.completed_this_cycle() || own.has_pending_claim() {
            return false;
        }
        if def.completion.is_single_claimer_family() {
            return self.completers().is_empty()
                && !def.assignees.iter().any(|a| self.cycle(*a).has_pending_claim());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn ids(n: u128) -> Vec<AssigneeId> {
        (1..=n).map(|i| AssigneeId::from_ulid(Ulid(i))).collect()
    }

    fn snapshot(mode: CompletionMode) -> (TaskSnapshot, Vec<AssigneeId>) {
        let people = ids(3);
        let mut def = TaskDefinition::new(TaskId::from_ulid(Ulid(99)), "dishes", people.clone());
        def.completion = mode;
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let record = TaskRecord::new(def, CycleRuntime::new(now, None));
        (TaskSnapshot::new(record), people)
    }

    #[test]
    fn window_start_needs_due_date_and_window() {
        let (mut snap, _) = snapshot(CompletionMode::Independent);
        let def = &mut snap.record.definition;
        assert_eq!(def.window_start(), None);

        let due = Utc.with_ymd_and_hms(2026, 1, 1, 18, 0, 0).unwrap();
        def.due_date = Some(due);
        assert_eq!(def.window_start(), None);

        def.due_window = Some(Duration::hours(2));
        assert_eq!(def.window_start(), Some(due - Duration::hours(2)));

        // a window reaching before the calendar's start has no start at all
        def.due_window = Some(Duration::days(100_000_000));
        assert_eq!(def.window_start(), None);
    }

    #[test]
    fn first_wins_completion_clears_everyone() {
        let (mut snap, people) = snapshot(CompletionMode::FirstWins);
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        snap.cycle_mut(people[1]).approve(t);

        assert!(snap.cycle_complete());
        assert!(people.iter().all(|p| !snap.is_delinquent(*p)));
    }

    #[test]
    fn all_required_tracks_each_assignee() {
        let (mut snap, people) = snapshot(CompletionMode::AllRequired);
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        snap.cycle_mut(people[0]).approve(t);
        snap.cycle_mut(people[1]).claim(t);

        assert!(!snap.cycle_complete());
        assert!(!snap.is_delinquent(people[0]));
        assert!(!snap.is_delinquent(people[1]));
        assert!(snap.is_delinquent(people[2]));
    }

    #[test]
    fn turn_holder_only_for_rotation() {
        let (mut snap, people) = snapshot(CompletionMode::FirstWins);
        snap.record.definition.rotation.turn = Some(people[1]);
        assert_eq!(snap.definition().turn_holder(), None);

        snap.record.definition.completion = CompletionMode::RotationRoundRobin;
        assert_eq!(snap.definition().turn_holder(), Some(people[1]));
    }
}
