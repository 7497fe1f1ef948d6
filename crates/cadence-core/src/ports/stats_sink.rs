//! StatsSink port - 統計集計への書き込み
//!
//! Approvals are bucketed by their effective instant, not by the time the
//! record arrives. Implementations also own `RotationHistory`: an approval
//! recorded here is what the fairness selector reads back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::StoreError;
use crate::domain::events::MissedReason;
use crate::domain::ids::{AssigneeId, TaskId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub task_id: TaskId,
    pub assignee_id: AssigneeId,
    pub effective_at: DateTime<Utc>,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedRecord {
    pub task_id: TaskId,
    pub assignee_id: AssigneeId,
    pub due_at: DateTime<Utc>,
    pub reason: MissedReason,
}

#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn record_approved(&self, record: ApprovalRecord) -> Result<(), StoreError>;

    async fn record_missed(&self, record: MissedRecord) -> Result<(), StoreError>;
}
