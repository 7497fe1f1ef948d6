//! Per-cycle and cross-cycle bookkeeping.
//!
//! - `AssigneeCycleState`: claim/approval flags, cleared at every boundary.
//! - `RotationHistory`: all-time counters, read-only to the engine.
//! - `CycleRuntime`: task-level markers that make the scanner and the
//!   boundary sequence idempotent across re-invocations and retries. Its
//!   `outbox` holds effects that were stored with their step but not yet
//!   delivered to the statistics and event sinks.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::boundary::Effect;
use super::ids::AssigneeId;
use super::state::Resolution;

/// Claim/approval flags of one assignee for the current cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeCycleState {
    /// Instant of the pending (unapproved) claim, if any.
    pub claimed_at: Option<DateTime<Utc>>,

    /// Effective completion instant of this cycle's approval.
    pub approved_at: Option<DateTime<Utc>>,

    /// Approvals recorded this cycle (greater than one only for multi triggers).
    pub approvals_this_cycle: u32,
}

impl AssigneeCycleState {
    pub const EMPTY: AssigneeCycleState = AssigneeCycleState {
        claimed_at: None,
        approved_at: None,
        approvals_this_cycle: 0,
    };

    pub fn has_pending_claim(&self) -> bool {
        self.claimed_at.is_some()
    }

    pub fn is_approved_this_cycle(&self) -> bool {
        self.approved_at.is_some()
    }

    /// Completed at least once during this cycle, even if reopened by a multi trigger.
    pub fn completed_this_cycle(&self) -> bool {
        self.approvals_this_cycle > 0
    }

    pub fn is_clean(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn claim(&mut self, at: DateTime<Utc>) {
        self.claimed_at = Some(at);
    }

    /// Turns the pending claim (if any) into an approval effective at `at`.
    pub fn approve(&mut self, at: DateTime<Utc>) {
        self.claimed_at = None;
        self.approved_at = Some(at);
        self.approvals_this_cycle += 1;
    }

    /// Makes the assignee claimable again without forgetting the approval count.
    pub fn reopen(&mut self) {
        self.claimed_at = None;
        self.approved_at = None;
    }

    pub fn drop_claim(&mut self) -> Option<DateTime<Utc>> {
        self.claimed_at.take()
    }
}

/// All-time rotation statistics of one assignee on one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationHistory {
    pub approved_count: u64,
    pub last_approved_at: Option<DateTime<Utc>>,
}

impl RotationHistory {
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.approved_count += 1;
        self.last_approved_at = Some(match self.last_approved_at {
            Some(prev) if prev > at => prev,
            _ => at,
        });
    }
}

/// Identity of one boundary firing.
///
/// The scanner compares keys, never instants, so firing detection does not
/// depend on how often it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum BoundaryKey {
    LocalDay(NaiveDate),
    DueDate(DateTime<Utc>),
    Approval(DateTime<Utc>),
    Manual(DateTime<Utc>),
}

/// A boundary that has started but not finished its reset step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryProgress {
    pub key: BoundaryKey,

    /// Instant the boundary is evaluated at; fixed across retries.
    pub at: DateTime<Utc>,

    pub overdue_applied: bool,
}

impl BoundaryProgress {
    pub fn new(key: BoundaryKey, at: DateTime<Utc>) -> Self {
        Self {
            key,
            at,
            overdue_applied: false,
        }
    }
}

/// Task-level markers for the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRuntime {
    pub cycle_started_at: DateTime<Utc>,

    /// Local day of the last midnight boundary (or of registration).
    pub last_fired_day: Option<NaiveDate>,

    /// Due date the last due-date boundary fired for.
    pub last_fired_due: Option<DateTime<Utc>>,

    /// Turn-holder when the cycle started (the "original holder").
    pub cycle_turn_holder: Option<AssigneeId>,

    /// The turn already moved this cycle.
    pub turn_advanced: bool,

    /// Set once the due-date crossing has been applied for this cycle.
    pub overdue_since: Option<DateTime<Utc>>,

    pub steal_window_open: bool,

    /// Assignees already recorded as missed by the due-date lock.
    pub missed_marked: Vec<AssigneeId>,

    /// An at-due-date boundary was deferred because the task is still overdue.
    pub held_since: Option<DateTime<Utc>>,

    pub boundary: Option<BoundaryProgress>,

    /// Effects saved with their step, awaiting delivery in order.
    /// Survives `start_cycle`; only a successful delivery removes an entry.
    #[serde(default)]
    pub outbox: Vec<Effect>,

    /// Last state published per assignee (for `StateChanged` diffs).
    pub published: BTreeMap<AssigneeId, Resolution>,
}

impl CycleRuntime {
    pub fn new(started_at: DateTime<Utc>, started_day: Option<NaiveDate>) -> Self {
        Self {
            cycle_started_at: started_at,
            last_fired_day: started_day,
            last_fired_due: None,
            cycle_turn_holder: None,
            turn_advanced: false,
            overdue_since: None,
            steal_window_open: false,
            missed_marked: Vec::new(),
            held_since: None,
            boundary: None,
            outbox: Vec::new(),
            published: BTreeMap::new(),
        }
    }

    /// Records which boundary fired so the scanner does not fire it again.
    pub fn mark_fired(&mut self, key: BoundaryKey) {
        match key {
            BoundaryKey::LocalDay(day) => self.last_fired_day = Some(day),
            BoundaryKey::DueDate(due) => self.last_fired_due = Some(due),
            BoundaryKey::Approval(_) | BoundaryKey::Manual(_) => {}
        }
    }

    /// Starts a new cycle at `at`, keeping only the firing markers and published states.
    pub fn start_cycle(&mut self, at: DateTime<Utc>, holder: Option<AssigneeId>) {
        self.cycle_started_at = at;
        self.cycle_turn_holder = holder;
        self.turn_advanced = false;
        self.overdue_since = None;
        self.steal_window_open = false;
        self.missed_marked.clear();
        self.held_since = None;
        self.boundary = None;
    }
}
