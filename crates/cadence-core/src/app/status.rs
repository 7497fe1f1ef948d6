//! Status - ステータスクエリとスキャン結果

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::axes::{CompletionMode, OverdueAxis, TriggerAxis};
use crate::domain::ids::{AssigneeId, TaskId};
use crate::domain::resolver;
use crate::domain::state::{CalculatedState, LockReason};
use crate::domain::task::TaskSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssigneeStatus {
    pub assignee_id: AssigneeId,
    pub state: CalculatedState,
    pub lock_reason: Option<LockReason>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub is_turn_holder: bool,
}

/// Task の現在の状態を説明する（割り当て先ごと）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub name: String,
    pub trigger: TriggerAxis,
    pub overdue: OverdueAxis,
    pub completion: CompletionMode,
    pub due_date: Option<DateTime<Utc>>,
    pub cycle_started_at: DateTime<Utc>,
    pub turn_holder: Option<AssigneeId>,
    pub override_active: bool,
    pub steal_window_open: bool,
    /// An `at_due_date` boundary is waiting for the task to be completed.
    pub held: bool,
    pub assignees: Vec<AssigneeStatus>,
}

impl TaskStatus {
    pub fn from_snapshot(snapshot: &TaskSnapshot, now: DateTime<Utc>) -> Self {
        let def = snapshot.definition();
        let rt = &snapshot.record.runtime;
        let turn_holder = def.turn_holder();
        let assignees = def
            .assignees
            .iter()
            .map(|a| {
                let cycle = snapshot.cycle(*a);
                let resolution = resolver::resolve(def, *a, now, cycle);
                AssigneeStatus {
                    assignee_id: *a,
                    state: resolution.state(),
                    lock_reason: resolution.lock_reason(),
                    claimed_at: cycle.claimed_at,
                    approved_at: cycle.approved_at,
                    is_turn_holder: turn_holder == Some(*a),
                }
            })
            .collect();

        Self {
            task_id: def.id,
            name: def.name.clone(),
            trigger: def.trigger,
            overdue: def.overdue,
            completion: def.completion,
            due_date: def.due_date,
            cycle_started_at: rt.cycle_started_at,
            turn_holder,
            override_active: def.rotation.override_active,
            steal_window_open: def.steal_active(now),
            held: rt.held_since.is_some(),
            assignees,
        }
    }

    pub fn assignee(&self, assignee_id: AssigneeId) -> Option<&AssigneeStatus> {
        self.assignees.iter().find(|a| a.assignee_id == assignee_id)
    }
}

/// How a boundary run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryRun {
    Completed,
    /// Stopped before the reset; the cycle stays open until the task is completed.
    Held,
}

/// Result of scanning one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub task_id: TaskId,
    pub crossed_due_date: bool,
    pub boundary: Option<BoundaryRun>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub task_id: TaskId,
    pub error: String,
    pub retryable: bool,
}

/// Aggregate of one scanner tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub scanned: usize,
    pub due_crossings: usize,
    pub boundaries_completed: usize,
    pub boundaries_held: usize,
    pub skipped_busy: usize,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    pub fn record(&mut self, outcome: &ScanOutcome) {
        self.scanned += 1;
        if outcome.crossed_due_date {
            self.due_crossings += 1;
        }
        match outcome.boundary {
            Some(BoundaryRun::Completed) => self.boundaries_completed += 1,
            Some(BoundaryRun::Held) => self.boundaries_held += 1,
            None => {}
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
