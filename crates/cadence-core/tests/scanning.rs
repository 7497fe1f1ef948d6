//! Scanner behaviour: idempotence, retries after storage failures, busy tasks
//! and concurrent operations on one task.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use cadence_core::app::{EngineBuilder, Scanner};
use cadence_core::domain::{
    AssigneeCycleState, AssigneeId, ClaimDecision, CompletionMode, CycleRuntime, DenyReason,
    EngineError, MissedReason, OverdueAxis, RotationHistory, StoreError, TaskId, TaskRecord,
    TaskSnapshot, TriggerAxis,
};
use cadence_core::impls::{InMemoryStore, RecordingEventSink};
use cadence_core::ports::{FixedClock, TaskStore};
use chrono::{Duration, FixedOffset};
use common::{Harness, after_midnight, due, start};
use tokio::sync::{Notify, Semaphore};

#[tokio::test]
async fn rescanning_the_same_instant_changes_nothing() {
    let h = Harness::new();
    let task = h
        .register(h.task(1, |d| {
            d.completion = CompletionMode::RotationRoundRobin;
            d.overdue = OverdueAxis::AllowSteal;
        }))
        .await;

    h.at(due() + Duration::minutes(1));
    let first = h.scanner.scan_once().await.unwrap();
    let events_after_first = h.events.events().await.len();
    let status_after_first = h.engine.status(task).await.unwrap();

    let second = h.scanner.scan_once().await.unwrap();
    assert_eq!(first.due_crossings, 1);
    assert_eq!(second.due_crossings, 0);
    assert_eq!(h.events.events().await.len(), events_after_first);
    assert_eq!(h.engine.status(task).await.unwrap(), status_after_first);
    assert_eq!(h.events_of("steal_window_opened").await.len(), 1);

    h.at(after_midnight());
    let boundary = h.scanner.scan_once().await.unwrap();
    let again = h.scanner.scan_once().await.unwrap();
    assert_eq!(boundary.boundaries_completed, 1);
    assert_eq!(again.boundaries_completed, 0);
    assert_eq!(h.events_of("rotation_advanced").await.len(), 1);
}

#[tokio::test]
async fn due_date_trigger_fires_once_per_due_date() {
    let h = Harness::new();
    let task = h
        .register(h.task(2, |d| {
            d.trigger = TriggerAxis::DueDateOnce;
            d.recurrence = cadence_core::domain::Recurrence::Daily;
        }))
        .await;

    h.at(due() + Duration::minutes(1));
    assert_eq!(h.scanner.scan_once().await.unwrap().boundaries_completed, 1);
    assert_eq!(h.scanner.scan_once().await.unwrap().boundaries_completed, 0);
    assert_eq!(
        h.engine.status(task).await.unwrap().due_date,
        Some(due() + Duration::days(1))
    );
}

#[tokio::test]
async fn failed_save_is_retried_on_the_next_scan() {
    let h = Harness::new();
    let task = h
        .register(h.task(3, |d| {
            d.completion = CompletionMode::RotationRoundRobin;
            d.overdue = OverdueAxis::ClearAndMarkMissed;
        }))
        .await;

    h.at(due() + Duration::minutes(30));
    h.scanner.scan_once().await.unwrap();

    h.at(after_midnight());
    h.store.fail_next_saves(1);
    let report = h.scanner.scan_once().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].retryable);
    assert_eq!(h.engine.status(task).await.unwrap().turn_holder, Some(h.a()));
    assert!(h.store.misses().await.is_empty());

    let report = h.scanner.scan_once().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.boundaries_completed, 1);

    let misses = h.store.misses().await;
    assert_eq!(misses.len(), 1);
    assert_eq!(misses[0].assignee_id, h.a());
    assert_eq!(misses[0].reason, MissedReason::ClearedAtBoundary);
    assert_eq!(h.engine.status(task).await.unwrap().turn_holder, Some(h.b()));
}

#[tokio::test]
async fn interrupted_boundary_resumes_without_repeating_applied_steps() {
    let h = Harness::new();
    let task = h
        .register(h.task(4, |d| {
            d.completion = CompletionMode::RotationRoundRobin;
            d.overdue = OverdueAxis::ClearAndMarkMissed;
        }))
        .await;

    h.at(after_midnight());
    // the overdue step is persisted, then its missed record fails
    h.store.fail_next_stats(1);
    let report = h.scanner.scan_once().await.unwrap();
    assert_eq!(report.failures.len(), 1);

    h.at(after_midnight() + Duration::minutes(1));
    let report = h.scanner.scan_once().await.unwrap();
    assert_eq!(report.boundaries_completed, 1);

    // the turn moved exactly once and the reset kept the original instant
    let status = h.engine.status(task).await.unwrap();
    assert_eq!(status.turn_holder, Some(h.b()));
    assert_eq!(status.cycle_started_at, after_midnight() - Duration::minutes(5));

    // the missed record queued with the overdue step was delivered on the retry
    let misses = h.store.misses().await;
    assert_eq!(misses.len(), 1);
    assert_eq!(misses[0].assignee_id, h.a());
    assert_eq!(misses[0].reason, MissedReason::ClearedAtBoundary);
    assert_eq!(h.events_of("missed").await.len(), 1);
    assert_eq!(h.events_of("rotation_advanced").await.len(), 1);

    h.at(after_midnight() + Duration::minutes(2));
    assert!(h.scanner.scan_once().await.unwrap().is_clean());
    assert_eq!(h.store.misses().await.len(), 1);
}

#[tokio::test]
async fn lock_misses_survive_a_failed_statistics_write() {
    let h = Harness::new();
    h.register(h.task(10, |d| {
        d.overdue = OverdueAxis::MarkMissedAndLock;
    }))
    .await;

    h.at(due() + Duration::minutes(1));
    h.store.fail_next_stats(1);
    let report = h.scanner.scan_once().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].retryable);
    assert!(h.store.misses().await.is_empty());

    h.at(due() + Duration::minutes(2));
    let report = h.scanner.scan_once().await.unwrap();
    assert!(report.is_clean());
    // the crossing itself is not applied again
    assert_eq!(report.due_crossings, 0);

    let misses = h.store.misses().await;
    assert_eq!(misses.len(), 3);
    assert!(misses.iter().all(|m| m.reason == MissedReason::LockedPastDue));
    assert_eq!(h.events_of("missed").await.len(), 3);

    h.scanner.scan_once().await.unwrap();
    assert_eq!(h.store.misses().await.len(), 3);
}

#[tokio::test]
async fn corrupt_stored_definition_is_a_permanent_failure() {
    let h = Harness::new();
    let def = h.task(11, |d| {
        d.completion = CompletionMode::RotationRoundRobin;
        d.assignees.truncate(1);
    });
    let task = def.id;
    let record = TaskRecord::new(def, CycleRuntime::new(start(), None));
    h.store.save_snapshot(&TaskSnapshot::new(record)).await.unwrap();

    let err = h.engine.status(task).await.unwrap_err();
    assert!(matches!(err, EngineError::InvariantViolated { .. }));
    assert!(!err.is_retryable());

    let report = h.scanner.scan_once().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].task_id, task);
    assert!(!report.failures[0].retryable);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_wins_claims_have_one_winner() {
    let h = Harness::new();
    let task = h
        .register(h.task(5, |d| {
            d.completion = CompletionMode::FirstWins;
        }))
        .await;

    let claims = h.people.iter().map(|who| {
        let engine = Arc::clone(&h.engine);
        let who = *who;
        tokio::spawn(async move { (who, engine.claim(task, who).await.unwrap()) })
    });
    let mut results = Vec::new();
    for handle in claims.collect::<Vec<_>>() {
        results.push(handle.await.unwrap());
    }

    let winners: Vec<AssigneeId> = results
        .iter()
        .filter(|(_, d)| d.is_allowed())
        .map(|(who, _)| *who)
        .collect();
    assert_eq!(winners.len(), 1);
    let winner = winners[0];
    for (who, decision) in &results {
        if *who != winner {
            assert_eq!(*decision, ClaimDecision::Denied(DenyReason::ClaimedByOther(winner)));
        }
    }
}

#[tokio::test]
async fn operations_on_unknown_or_unassigned_targets_fail() {
    let h = Harness::new();
    let task = h.register(h.task(6, |_| {})).await;
    let stranger = AssigneeId::from_ulid(ulid::Ulid(77));

    assert!(matches!(
        h.engine.status(TaskId::from_ulid(ulid::Ulid(404))).await,
        Err(EngineError::TaskNotFound(_))
    ));
    assert_eq!(
        h.engine.claim(task, stranger).await.unwrap(),
        ClaimDecision::Denied(DenyReason::NotAssigned)
    );
    assert!(matches!(
        h.engine.approve(task, h.a()).await,
        Err(EngineError::NoPendingClaim { .. })
    ));
    assert!(matches!(
        h.engine.register_task(h.task(6, |_| {})).await,
        Err(EngineError::DuplicateTask(_))
    ));
}

#[tokio::test]
async fn switching_to_rotation_starts_at_the_head() {
    let h = Harness::new();
    let def = h.task(7, |d| d.completion = CompletionMode::FirstWins);
    let task = h.register(def.clone()).await;
    assert_eq!(h.engine.status(task).await.unwrap().turn_holder, None);

    let mut rotated = def.clone();
    rotated.completion = CompletionMode::RotationRoundRobin;
    let status = h.engine.update_task(rotated).await.unwrap();
    assert_eq!(status.turn_holder, Some(h.a()));

    h.engine.set_rotation_override(task, true).await.unwrap();
    assert!(h.engine.can_claim(task, h.c()).await.unwrap().is_allowed());

    let status = h.engine.update_task(def).await.unwrap();
    assert_eq!(status.turn_holder, None);
    assert!(!status.override_active);
}

/// Store whose `get_task` can be parked until the test releases it.
struct GatedStore {
    inner: Arc<InMemoryStore>,
    gated: AtomicBool,
    entered: Notify,
    release: Semaphore,
}

#[async_trait]
impl TaskStore for GatedStore {
    async fn list_task_ids(&self) -> Result<Vec<TaskId>, StoreError> {
        self.inner.list_task_ids().await
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        if self.gated.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            let permit = self
                .release
                .acquire()
                .await
                .map_err(|e| StoreError::new("get_task", e.to_string()))?;
            permit.forget();
        }
        self.inner.get_task(task_id).await
    }

    async fn get_cycle_state(
        &self,
        task_id: TaskId,
        assignee_id: AssigneeId,
    ) -> Result<AssigneeCycleState, StoreError> {
        self.inner.get_cycle_state(task_id, assignee_id).await
    }

    async fn get_rotation_history(
        &self,
        task_id: TaskId,
        assignee_id: AssigneeId,
    ) -> Result<RotationHistory, StoreError> {
        self.inner.get_rotation_history(task_id, assignee_id).await
    }

    async fn save_snapshot(&self, snapshot: &TaskSnapshot) -> Result<(), StoreError> {
        self.inner.save_snapshot(snapshot).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scanner_skips_a_task_held_by_another_operation() {
    let inner = Arc::new(InMemoryStore::new(FixedOffset::east_opt(0).unwrap()));
    let store = Arc::new(GatedStore {
        inner: inner.clone(),
        gated: AtomicBool::new(false),
        entered: Notify::new(),
        release: Semaphore::new(0),
    });
    let engine = Arc::new(
        EngineBuilder::new()
            .task_store(store.clone())
            .stats_sink(inner)
            .event_sink(Arc::new(RecordingEventSink::new()))
            .clock(Arc::new(FixedClock::new(start())))
            .build()
            .unwrap(),
    );
    let h = Harness::new();
    let task = h.task(8, |_| {});
    let task_id = task.id;
    engine.register_task(task).await.unwrap();

    store.gated.store(true, Ordering::SeqCst);
    let claimer = {
        let engine = Arc::clone(&engine);
        let who = h.a();
        tokio::spawn(async move { engine.claim(task_id, who).await })
    };
    store.entered.notified().await;

    let scanner = Scanner::new(Arc::clone(&engine));
    let report = scanner.scan_once().await.unwrap();
    assert_eq!(report.skipped_busy, 1);
    assert_eq!(report.scanned, 0);
    assert!(report.is_clean());

    store.release.add_permits(1);
    assert!(claimer.await.unwrap().unwrap().is_allowed());
    assert_eq!(scanner.scan_once().await.unwrap().scanned, 1);
}

#[tokio::test]
async fn spawned_scanner_ticks_until_shutdown() {
    let h = Harness::new();
    h.register(h.task(9, |d| {
        d.completion = CompletionMode::RotationRoundRobin;
        d.overdue = OverdueAxis::AllowSteal;
    }))
    .await;
    h.at(due() + Duration::minutes(1));

    let handle = Arc::new(Scanner::new(Arc::clone(&h.engine))).spawn(StdDuration::from_millis(10));
    let mut opened = false;
    for _ in 0..100 {
        if !h.events_of("steal_window_opened").await.is_empty() {
            opened = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    handle.shutdown_and_join().await;
    assert!(opened);
    assert_eq!(h.events_of("steal_window_opened").await.len(), 1);
}
