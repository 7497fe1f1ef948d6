//! InMemoryStore - 開発・テスト用の TaskStore + StatsSink
//!
//! # 学習ポイント
//! - tokio::sync::Mutex による状態の排他制御（ロックを跨いで await しない）
//! - 統計は effective instant のローカル日付でバケット化
//! - 障害注入（`fail_next_saves` / `fail_next_stats`）でリトライ経路をテスト

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::boundary::local_day;
use crate::domain::cycle::{AssigneeCycleState, RotationHistory};
use crate::domain::errors::StoreError;
use crate::domain::ids::{AssigneeId, TaskId};
use crate::domain::task::{TaskRecord, TaskSnapshot};
use crate::ports::{ApprovalRecord, MissedRecord, StatsSink, TaskStore};

/// Per-local-day totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyTotals {
    pub approved: u32,
    pub points: f64,
    pub missed: u32,
}

#[derive(Default)]
struct StoreState {
    tasks: HashMap<TaskId, TaskRecord>,
    cycles: HashMap<(TaskId, AssigneeId), AssigneeCycleState>,
    history: HashMap<(TaskId, AssigneeId), RotationHistory>,
    approvals: Vec<ApprovalRecord>,
    misses: Vec<MissedRecord>,
    daily: BTreeMap<NaiveDate, DailyTotals>,
}

/// InMemoryStore は開発用のストア
///
/// # 使用例
/// ```ignore
/// let store = Arc::new(InMemoryStore::new(offset));
/// let engine = EngineBuilder::new()
///     .task_store(store.clone())
///     .stats_sink(store.clone())
///     ...
/// ```
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    offset: FixedOffset,
    fail_saves: AtomicU32,
    fail_stats: AtomicU32,
}

impl InMemoryStore {
    /// `offset` decides which local day an approval is counted on.
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            offset,
            fail_saves: AtomicU32::new(0),
            fail_stats: AtomicU32::new(0),
        }
    }

    /// The next `n` calls to `save_snapshot` fail.
    pub fn fail_next_saves(&self, n: u32) {
        self.fail_saves.store(n, Ordering::SeqCst);
    }

    /// The next `n` statistics writes fail.
    pub fn fail_next_stats(&self, n: u32) {
        self.fail_stats.store(n, Ordering::SeqCst);
    }

    /// Seeds rotation history, e.g. when importing an existing household.
    pub async fn seed_history(
        &self,
        task_id: TaskId,
        assignee_id: AssigneeId,
        history: RotationHistory,
    ) {
        self.state.lock().await.history.insert((task_id, assignee_id), history);
    }

    pub async fn approvals(&self) -> Vec<ApprovalRecord> {
        self.state.lock().await.approvals.clone()
    }

    pub async fn misses(&self) -> Vec<MissedRecord> {
        self.state.lock().await.misses.clone()
    }

    pub async fn daily_totals(&self) -> BTreeMap<NaiveDate, DailyTotals> {
        self.state.lock().await.daily.clone()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn list_task_ids(&self) -> Result<Vec<TaskId>, StoreError> {
        let state = self.state.lock().await;
        let mut ids: Vec<TaskId> = state.tasks.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.state.lock().await.tasks.get(&task_id).cloned())
    }

    async fn get_cycle_state(
        &self,
        task_id: TaskId,
        assignee_id: AssigneeId,
    ) -> Result<AssigneeCycleState, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .cycles
            .get(&(task_id, assignee_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_rotation_history(
        &self,
        task_id: TaskId,
        assignee_id: AssigneeId,
    ) -> Result<RotationHistory, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .get(&(task_id, assignee_id))
            .copied()
            .unwrap_or_default())
    }

    async fn save_snapshot(&self, snapshot: &TaskSnapshot) -> Result<(), StoreError> {
        if Self::take_failure(&self.fail_saves) {
            return Err(StoreError::new("save_snapshot", "injected failure"));
        }
        let task_id = snapshot.record.id();
        let mut state = self.state.lock().await;
        state.cycles.retain(|(t, _), _| *t != task_id);
        for (assignee, cycle) in &snapshot.cycles {
            if !cycle.is_clean() {
                state.cycles.insert((task_id, *assignee), cycle.clone());
            }
        }
        state.tasks.insert(task_id, snapshot.record.clone());
        Ok(())
    }
}

#[async_trait]
impl StatsSink for InMemoryStore {
    async fn record_approved(&self, record: ApprovalRecord) -> Result<(), StoreError> {
        if Self::take_failure(&self.fail_stats) {
            return Err(StoreError::new("record_approved", "injected failure"));
        }
        let day = local_day(record.effective_at, self.offset);
        let mut state = self.state.lock().await;
        state
            .history
            .entry((record.task_id, record.assignee_id))
            .or_default()
            .record(record.effective_at);
        let totals = state.daily.entry(day).or_default();
        totals.approved += 1;
        totals.points += record.points;
        state.approvals.push(record);
        Ok(())
    }

    async fn record_missed(&self, record: MissedRecord) -> Result<(), StoreError> {
        if Self::take_failure(&self.fail_stats) {
            return Err(StoreError::new("record_missed", "injected failure"));
        }
        let day = local_day(record.due_at, self.offset);
        let mut state = self.state.lock().await;
        state.daily.entry(day).or_default().missed += 1;
        state.misses.push(record);
        Ok(())
    }
}
