//! BoundaryProcessor - 境界シーケンスの実行
//!
//! 純粋な `domain::boundary` の各ステップを順に実行し、
//! ステップごとに「保存 (効果は outbox に積む) → 統計 → 通知」の順で外部に反映します。
//! 保存に失敗したステップは次のスキャンで再実行されます。
//! 統計の書き込みに失敗した効果は outbox に残り、次の操作かスキャンで再配信されます。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::status::BoundaryRun;
use crate::domain::boundary::{self, BoundaryStep, Effect, StepPlan};
use crate::domain::cycle::{BoundaryProgress, RotationHistory};
use crate::domain::errors::EngineError;
use crate::domain::events::DomainEvent;
use crate::domain::ids::AssigneeId;
use crate::domain::resolver;
use crate::domain::task::TaskSnapshot;
use crate::ports::{ApprovalRecord, EventSink, MissedRecord, StatsSink, TaskStore};

/// The engine's outbound collaborators.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub store: Arc<dyn TaskStore>,
    pub stats: Arc<dyn StatsSink>,
    pub events: Arc<dyn EventSink>,
}

impl Collaborators {
    pub async fn load_history(
        &self,
        snapshot: &TaskSnapshot,
    ) -> Result<HashMap<AssigneeId, RotationHistory>, EngineError> {
        let def = snapshot.definition();
        let mut history = HashMap::with_capacity(def.assignees.len());
        if !def.completion.is_rotation_family() {
            return Ok(history);
        }
        for assignee in &def.assignees {
            let h = self.store.get_rotation_history(def.id, *assignee).await?;
            history.insert(*assignee, h);
        }
        Ok(history)
    }

    /// Persists `plan.next` with its effects queued in the outbox, then
    /// delivers the outbox.
    pub async fn commit(
        &self,
        snapshot: &mut TaskSnapshot,
        plan: StepPlan,
    ) -> Result<(), EngineError> {
        let mut next = plan.next;
        next.record.runtime.outbox.extend(plan.effects);
        self.store.save_snapshot(&next).await?;
        *snapshot = next;
        self.flush_outbox(snapshot).await
    }

    /// Delivers queued effects in order and stores what is left.
    ///
    /// Stops at the first statistics failure. That effect and everything
    /// after it stay queued for the next attempt.
    pub async fn flush_outbox(&self, snapshot: &mut TaskSnapshot) -> Result<(), EngineError> {
        if snapshot.record.runtime.outbox.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut snapshot.record.runtime.outbox);
        let mut delivered = 0;
        let mut failure = None;
        for effect in &pending {
            match self.deliver(snapshot, *effect).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        snapshot.record.runtime.outbox = pending[delivered..].to_vec();

        let saved = self.store.save_snapshot(snapshot).await;
        match failure {
            Some(e) => {
                let task_id = snapshot.record.id();
                let queued = pending.len() - delivered;
                warn!(task_id = %task_id, queued, error = %e, "effect delivery deferred");
                if let Err(save) = saved {
                    warn!(task_id = %task_id, error = %save, "outbox progress not stored");
                }
                Err(e)
            }
            // 保存に失敗した場合、配信済みの効果は次回もう一度配信される
            None => saved.map_err(Into::into),
        }
    }

    async fn deliver(&self, snapshot: &TaskSnapshot, effect: Effect) -> Result<(), EngineError> {
        let def = snapshot.definition();
        let task_id = def.id;
        let event = match effect {
            Effect::Approved {
                assignee,
                effective_at,
            } => {
                self.stats
                    .record_approved(ApprovalRecord {
                        task_id,
                        assignee_id: assignee,
                        effective_at,
                        points: def.points,
                    })
                    .await?;
                DomainEvent::Approved {
                    task_id,
                    assignee_id: assignee,
                    effective_at,
                }
            }
            Effect::Missed {
                assignee,
                due_at,
                reason,
            } => {
                self.stats
                    .record_missed(MissedRecord {
                        task_id,
                        assignee_id: assignee,
                        due_at,
                        reason,
                    })
                    .await?;
                DomainEvent::Missed {
                    task_id,
                    assignee_id: assignee,
                    due_at,
                    reason,
                }
            }
            Effect::RotationAdvanced { previous, new } => {
                info!(task_id = %task_id, previous = ?previous, new = %new, "rotation advanced");
                DomainEvent::RotationAdvanced {
                    task_id,
                    previous,
                    new,
                }
            }
            Effect::StealWindowOpened => {
                info!(task_id = %task_id, "steal window opened");
                DomainEvent::StealWindowOpened { task_id }
            }
        };
        self.emit(event).await;
        Ok(())
    }

    pub async fn emit(&self, event: DomainEvent) {
        if let Err(e) = self.events.emit(&event).await {
            warn!(
                task_id = %event.task_id(),
                kind = event.kind(),
                error = %e,
                "event delivery failed"
            );
        }
    }

    /// Emits `StateChanged` for every assignee whose resolved state moved
    /// since the last publication.
    pub async fn publish_states(
        &self,
        snapshot: &mut TaskSnapshot,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), EngineError> {
        let def = snapshot.definition();
        let mut changes = Vec::new();
        for assignee in &def.assignees {
            let resolution = resolver::resolve(def, *assignee, now, snapshot.cycle(*assignee));
            let previous = snapshot.record.runtime.published.get(assignee).copied();
            if previous != Some(resolution) {
                changes.push((*assignee, previous, resolution));
            }
        }
        let stale = snapshot
            .record
            .runtime
            .published
            .keys()
            .any(|a| !def.is_assigned(*a));
        if changes.is_empty() && !stale {
            return Ok(());
        }

        let task_id = def.id;
        let mut next = snapshot.clone();
        let assignees = next.record.definition.assignees.clone();
        let published = &mut next.record.runtime.published;
        published.retain(|a, _| assignees.contains(a));
        for (assignee, _, resolution) in &changes {
            published.insert(*assignee, *resolution);
        }
        self.store.save_snapshot(&next).await?;
        *snapshot = next;

        for (assignee, previous, resolution) in changes {
            debug!(
                task_id = %task_id,
                assignee_id = %assignee,
                old = ?previous.map(|r| r.state()),
                new = %resolution.state(),
                "state changed"
            );
            self.emit(DomainEvent::StateChanged {
                task_id,
                assignee_id: assignee,
                old: previous.map(|r| r.state()),
                new: resolution.state(),
                lock_reason: resolution.lock_reason(),
            })
            .await;
        }
        Ok(())
    }
}

/// Runs (or resumes) the boundary sequence for one task.
///
/// An interrupted boundary already recorded on the snapshot takes precedence
/// over `progress`, so a retry keeps its original key and instant.
pub(crate) async fn run_boundary(
    collaborators: &Collaborators,
    snapshot: &mut TaskSnapshot,
    progress: BoundaryProgress,
) -> Result<BoundaryRun, EngineError> {
    let task_id = snapshot.record.id();
    let mut progress = snapshot.record.runtime.boundary.unwrap_or(progress);
    snapshot.record.runtime.boundary = Some(progress);
    let history = collaborators.load_history(snapshot).await?;

    info!(task_id = %task_id, key = ?progress.key, at = %progress.at, "boundary started");

    for step in BoundaryStep::ORDER {
        let plan = boundary::plan_step(step, snapshot, progress, &history);
        let held = plan.held;
        debug!(
            task_id = %task_id,
            step = step.as_str(),
            effects = plan.effects.len(),
            "boundary step"
        );
        if let Err(e) = collaborators.commit(snapshot, plan).await {
            warn!(task_id = %task_id, step = step.as_str(), error = %e, "boundary step failed");
            return Err(e);
        }
        if held {
            info!(task_id = %task_id, "boundary held while overdue");
            return Ok(BoundaryRun::Held);
        }
        if let Some(recorded) = snapshot.record.runtime.boundary {
            progress = recorded;
        }
    }

    info!(task_id = %task_id, due_date = ?snapshot.definition().due_date, "boundary completed");
    Ok(BoundaryRun::Completed)
}
