//! TaskStore port - タスク定義・サイクル状態・ローテーション履歴の正本
//!
//! TaskStore は以下を管理します：
//! - タスク定義とランタイムマーカー（`TaskRecord`）
//! - 割り当て先ごとのサイクル状態（`AssigneeCycleState`）
//! - ローテーション履歴（`RotationHistory`、読み取り専用）
//!
//! # 設計原則
//! - `save_snapshot` は 1 タスク分の記録とサイクル状態をまとめて置き換える
//! - エンジンはタスクごとのロックの内側でのみ書き込む

use async_trait::async_trait;

use crate::domain::cycle::{AssigneeCycleState, RotationHistory};
use crate::domain::errors::StoreError;
use crate::domain::ids::{AssigneeId, TaskId};
use crate::domain::task::{TaskRecord, TaskSnapshot};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list_task_ids(&self) -> Result<Vec<TaskId>, StoreError>;

    async fn get_task(&self, task_id: TaskId) -> Result<Option<TaskRecord>, StoreError>;

    /// Missing state reads as empty.
    async fn get_cycle_state(
        &self,
        task_id: TaskId,
        assignee_id: AssigneeId,
    ) -> Result<AssigneeCycleState, StoreError>;

    /// Missing history reads as never approved.
    async fn get_rotation_history(
        &self,
        task_id: TaskId,
        assignee_id: AssigneeId,
    ) -> Result<RotationHistory, StoreError>;

    /// Writes the record and replaces every cycle state of the task.
    async fn save_snapshot(&self, snapshot: &TaskSnapshot) -> Result<(), StoreError>;
}
