//! Engine - タスク操作の入口
//!
//! すべての書き込み操作はタスクごとのロックを取得してから
//! 「読み込み → 純粋関数で計画 → 保存 → 通知」の順に進みます。
//! on-approval などの同期境界も、ロックを解放する前に完了させます。

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info};

use super::boundary::{Collaborators, run_boundary};
use super::locks::TaskLocks;
use super::status::{BoundaryRun, ScanOutcome, TaskStatus};
use crate::config::EngineConfig;
use crate::domain::approval;
use crate::domain::boundary::{self, local_day};
use crate::domain::claim_gate::{self, ClaimDecision};
use crate::domain::cycle::{BoundaryKey, BoundaryProgress, CycleRuntime};
use crate::domain::errors::{ConfigError, EngineError};
use crate::domain::ids::{AssigneeId, TaskId};
use crate::domain::resolver;
use crate::domain::rotation;
use crate::domain::state::Resolution;
use crate::domain::task::{TaskDefinition, TaskRecord, TaskSnapshot};
use crate::domain::validation;
use crate::ports::Clock;

/// Result of a successful approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalReceipt {
    pub effective_at: DateTime<Utc>,
    /// The approval completed the cycle and ran the boundary synchronously.
    pub boundary: Option<BoundaryRun>,
}

pub struct Engine {
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    offset: FixedOffset,
    locks: TaskLocks,
}

impl Engine {
    pub(crate) fn new(
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        let offset = config.utc_offset()?;
        Ok(Self {
            collaborators,
            clock,
            config,
            offset,
            locks: TaskLocks::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn task_ids(&self) -> Result<Vec<TaskId>, EngineError> {
        Ok(self.collaborators.store.list_task_ids().await?)
    }

    // ========================================
    // 構成操作
    // ========================================

    pub async fn register_task(
        &self,
        definition: TaskDefinition,
    ) -> Result<TaskStatus, EngineError> {
        let definition = validation::normalize(definition)?;
        let task_id = definition.id;
        let _guard = self.locks.lock(task_id).await;
        if self.collaborators.store.get_task(task_id).await?.is_some() {
            return Err(EngineError::DuplicateTask(task_id));
        }

        let now = self.clock.now();
        let mut runtime = CycleRuntime::new(now, Some(local_day(now, self.offset)));
        runtime.cycle_turn_holder = definition.turn_holder();
        let mut snapshot = TaskSnapshot::new(TaskRecord::new(definition, runtime));
        self.collaborators.store.save_snapshot(&snapshot).await?;
        info!(task_id = %task_id, name = %snapshot.definition().name, "task registered");

        self.collaborators.publish_states(&mut snapshot, now).await?;
        Ok(TaskStatus::from_snapshot(&snapshot, now))
    }

    /// Replaces the definition, keeping the rotation pointer through the
    /// completion-mode transition rules.
    pub async fn update_task(&self, definition: TaskDefinition) -> Result<TaskStatus, EngineError> {
        let task_id = definition.id;
        let _guard = self.locks.lock(task_id).await;
        let mut snapshot = self.load(task_id).await?;
        let old = snapshot.definition().clone();

        let mut updated = definition;
        let patch = rotation::transition_actions(old.completion, updated.completion, &updated)?;
        updated.rotation = old.rotation;
        patch.apply(&mut updated.rotation);
        let updated = validation::normalize(updated)?;

        snapshot.cycles.retain(|a, _| updated.is_assigned(*a));
        let rt = &mut snapshot.record.runtime;
        if updated.due_date != old.due_date {
            rt.overdue_since = None;
            rt.steal_window_open = false;
            rt.missed_marked.clear();
        }
        let holder_valid = rt.cycle_turn_holder.is_some_and(|h| updated.is_assigned(h));
        if !holder_valid || !updated.completion.is_rotation_family() {
            rt.cycle_turn_holder = updated.turn_holder();
        }
        snapshot.record.definition = updated;

        self.collaborators.store.save_snapshot(&snapshot).await?;
        info!(task_id = %task_id, completion = %snapshot.definition().completion, "task updated");

        let now = self.clock.now();
        self.collaborators.publish_states(&mut snapshot, now).await?;
        Ok(TaskStatus::from_snapshot(&snapshot, now))
    }

    pub async fn set_rotation_override(
        &self,
        task_id: TaskId,
        active: bool,
    ) -> Result<(), EngineError> {
        let _guard = self.locks.lock(task_id).await;
        let mut snapshot = self.load(task_id).await?;
        let mode = snapshot.definition().completion;
        if !mode.is_rotation_family() {
            return Err(ConfigError::OverrideWithoutRotation(mode).into());
        }
        snapshot.record.definition.rotation.override_active = active;
        self.collaborators.store.save_snapshot(&snapshot).await?;
        info!(task_id = %task_id, active, "rotation override set");

        self.collaborators.publish_states(&mut snapshot, self.clock.now()).await
    }

    // ========================================
    // 割り当て先の操作
    // ========================================

    /// Claims the task for `assignee`. A refusal is `Ok(Denied(..))`.
    pub async fn claim(
        &self,
        task_id: TaskId,
        assignee: AssigneeId,
    ) -> Result<ClaimDecision, EngineError> {
        let _guard = self.locks.lock(task_id).await;
        let mut snapshot = self.load(task_id).await?;
        let now = self.clock.now();

        let decision =
            claim_gate::can_claim(snapshot.definition(), assignee, now, &snapshot.cycles);
        match decision {
            ClaimDecision::Allowed => {
                snapshot.cycle_mut(assignee).claim(now);
                self.collaborators.store.save_snapshot(&snapshot).await?;
                info!(task_id = %task_id, assignee_id = %assignee, "claimed");
            }
            ClaimDecision::Denied(reason) => {
                debug!(task_id = %task_id, assignee_id = %assignee, %reason, "claim denied");
            }
        }

        self.collaborators.publish_states(&mut snapshot, now).await?;
        Ok(decision)
    }

    /// Approves `assignee`'s pending claim, effective now.
    pub async fn approve(
        &self,
        task_id: TaskId,
        assignee: AssigneeId,
    ) -> Result<ApprovalReceipt, EngineError> {
        let _guard = self.locks.lock(task_id).await;
        let mut snapshot = self.load(task_id).await?;
        self.ensure_assigned(&snapshot, assignee)?;
        let now = self.clock.now();

        let history = self.collaborators.load_history(&snapshot).await?;
        let mut plan = approval::plan_approval(&snapshot, assignee, now, &history).ok_or(
            EngineError::NoPendingClaim {
                task_id,
                assignee_id: assignee,
            },
        )?;

        // 同期境界は承認と同じ保存で記録する。統計の失敗後はスキャンが再開する
        let completes = approval::completes_boundary(&plan.next, now);
        let progress = BoundaryProgress::new(BoundaryKey::Approval(now), now);
        if completes {
            plan.next.record.runtime.boundary.get_or_insert(progress);
        }
        self.collaborators.commit(&mut snapshot, plan).await?;
        info!(task_id = %task_id, assignee_id = %assignee, "approved");

        let boundary = if completes {
            Some(run_boundary(&self.collaborators, &mut snapshot, progress).await?)
        } else {
            None
        };

        self.collaborators.publish_states(&mut snapshot, now).await?;
        Ok(ApprovalReceipt {
            effective_at: now,
            boundary,
        })
    }

    /// Rejects a pending claim; the assignee may claim again.
    pub async fn disapprove(
        &self,
        task_id: TaskId,
        assignee: AssigneeId,
    ) -> Result<(), EngineError> {
        let _guard = self.locks.lock(task_id).await;
        let mut snapshot = self.load(task_id).await?;
        self.ensure_assigned(&snapshot, assignee)?;

        if snapshot.cycle_mut(assignee).drop_claim().is_none() {
            return Err(EngineError::NoPendingClaim {
                task_id,
                assignee_id: assignee,
            });
        }
        self.collaborators.store.save_snapshot(&snapshot).await?;
        info!(task_id = %task_id, assignee_id = %assignee, "claim disapproved");

        self.collaborators.publish_states(&mut snapshot, self.clock.now()).await
    }

    /// Fires the boundary by hand. The only way a `manual` task ever resets.
    pub async fn reset_task(&self, task_id: TaskId) -> Result<BoundaryRun, EngineError> {
        let _guard = self.locks.lock(task_id).await;
        let mut snapshot = self.load(task_id).await?;
        let now = self.clock.now();
        let progress = BoundaryProgress::new(BoundaryKey::Manual(now), now);
        let run = run_boundary(&self.collaborators, &mut snapshot, progress).await?;
        self.collaborators.publish_states(&mut snapshot, now).await?;
        Ok(run)
    }

    // ========================================
    // 読み取り
    // ========================================

    pub async fn resolve(
        &self,
        task_id: TaskId,
        assignee: AssigneeId,
    ) -> Result<Resolution, EngineError> {
        let snapshot = self.load(task_id).await?;
        self.ensure_assigned(&snapshot, assignee)?;
        let now = self.clock.now();
        Ok(resolver::resolve(snapshot.definition(), assignee, now, snapshot.cycle(assignee)))
    }

    pub async fn can_claim(
        &self,
        task_id: TaskId,
        assignee: AssigneeId,
    ) -> Result<ClaimDecision, EngineError> {
        let snapshot = self.load(task_id).await?;
        let now = self.clock.now();
        Ok(claim_gate::can_claim(snapshot.definition(), assignee, now, &snapshot.cycles))
    }

    pub async fn status(&self, task_id: TaskId) -> Result<TaskStatus, EngineError> {
        let snapshot = self.load(task_id).await?;
        Ok(TaskStatus::from_snapshot(&snapshot, self.clock.now()))
    }

    // ========================================
    // スキャン
    // ========================================

    /// Scans one task, waiting for its lock.
    pub async fn scan_task(&self, task_id: TaskId) -> Result<ScanOutcome, EngineError> {
        let _guard = self.locks.lock(task_id).await;
        self.scan_locked(task_id).await
    }

    /// Scans one task unless another operation holds it (`TaskBusy`).
    pub async fn try_scan_task(&self, task_id: TaskId) -> Result<ScanOutcome, EngineError> {
        let Some(_guard) = self.locks.try_lock(task_id).await else {
            return Err(EngineError::TaskBusy(task_id));
        };
        self.scan_locked(task_id).await
    }

    async fn scan_locked(&self, task_id: TaskId) -> Result<ScanOutcome, EngineError> {
        let mut snapshot = self.load(task_id).await?;
        let now = self.clock.now();
        self.collaborators.flush_outbox(&mut snapshot).await?;

        let crossing = boundary::plan_due_crossing(&snapshot, now);
        let crossed_due_date = !crossing.is_noop(&snapshot);
        if crossed_due_date {
            debug!(task_id = %task_id, "due date crossed");
            self.collaborators.commit(&mut snapshot, crossing).await?;
        }

        let boundary = match boundary::fired_boundary(&snapshot, now, self.offset) {
            Some(progress) => {
                Some(run_boundary(&self.collaborators, &mut snapshot, progress).await?)
            }
            None => None,
        };

        self.collaborators.publish_states(&mut snapshot, now).await?;
        Ok(ScanOutcome {
            task_id,
            crossed_due_date,
            boundary,
        })
    }

    /// Forgets lock handles of tasks nobody is operating on.
    pub(crate) async fn prune_locks(&self) -> usize {
        self.locks.prune().await
    }

    // ========================================
    // 内部
    // ========================================

    async fn load(&self, task_id: TaskId) -> Result<TaskSnapshot, EngineError> {
        let store = &self.collaborators.store;
        let record = store
            .get_task(task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(task_id))?;
        validation::check_stored(&record.definition).map_err(|e| {
            EngineError::invariant(task_id, format!("stored definition is invalid: {e}"))
        })?;

        let mut snapshot = TaskSnapshot::new(record);
        let assignees = snapshot.definition().assignees.clone();
        for assignee in assignees {
            let state = store.get_cycle_state(task_id, assignee).await?;
            if !state.is_clean() {
                snapshot.cycles.insert(assignee, state);
            }
        }
        Ok(snapshot)
    }

    fn ensure_assigned(
        &self,
        snapshot: &TaskSnapshot,
        assignee: AssigneeId,
    ) -> Result<(), EngineError> {
        if snapshot.definition().is_assigned(assignee) {
            Ok(())
        } else {
            Err(EngineError::NotAssigned {
                task_id: snapshot.record.id(),
                assignee_id: assignee,
            })
        }
    }
}
