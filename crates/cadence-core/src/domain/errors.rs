//! Errors - エラー型と分類
//!
//! Three families surface from the engine:
//! - `ConfigError`: a task definition is rejected before it reaches the runtime.
//! - `StoreError` / `SinkError`: a collaborator failed; boundary steps are retried.
//! - `EngineError::InvariantViolated`: corrupted input, never retried.
//!
//! A denied claim is not an error; see `claim_gate::ClaimDecision`.

use thiserror::Error;

use super::axes::{CompletionMode, OverdueAxis, TriggerAxis};
use super::ids::{AssigneeId, TaskId};

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（次のスキャンでリトライ）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: 協調先（ストレージなど）の障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// A task definition that must not reach the runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("task has no assignees")]
    NoAssignees,

    #[error("{mode} needs at least 2 assignees, got {count}")]
    TooFewAssignees { mode: CompletionMode, count: usize },

    #[error("assignee {0} is listed more than once")]
    DuplicateAssignee(AssigneeId),

    #[error("overdue policy {overdue} cannot be combined with trigger {trigger}: {reason}")]
    IncompatibleAxes {
        trigger: TriggerAxis,
        overdue: OverdueAxis,
        reason: &'static str,
    },

    #[error("{overdue} requires a rotation completion mode, got {mode}")]
    RequiresRotation { overdue: OverdueAxis, mode: CompletionMode },

    #[error("{overdue} requires a due date")]
    RequiresDueDate { overdue: OverdueAxis },

    #[error("rotation cannot use the multi-approval trigger {0}")]
    RotationWithMultiTrigger(TriggerAxis),

    #[error("due window must be positive")]
    NonPositiveWindow,

    #[error("due window reaches before the earliest representable instant")]
    WindowOutOfRange,

    #[error("points must be a finite, non-negative number")]
    InvalidPoints,

    #[error("task name must not be empty")]
    EmptyName,

    #[error("unknown assignee name '{0}'")]
    UnknownAssignee(String),

    #[error("assignee name '{0}' is used twice")]
    DuplicateName(String),

    #[error("rotation override needs a rotation completion mode, got {0}")]
    OverrideWithoutRotation(CompletionMode),

    #[error("invalid utc offset of {0} minutes")]
    InvalidUtcOffset(i32),

    #[error("cannot parse configuration: {0}")]
    Parse(String),
}

/// Failure reported by the storage or statistics collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message}")]
pub struct StoreError {
    pub operation: &'static str,
    pub message: String,
}

impl StoreError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Failure reported by the notification dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event sink: {0}")]
pub struct SinkError(pub String);

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(#[from] ConfigError),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    #[error("invariant violated on {task_id}: {detail}")]
    InvariantViolated { task_id: TaskId, detail: String },

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Another operation holds the task; the scanner retries on its next tick.
    #[error("task busy: {0}")]
    TaskBusy(TaskId),

    #[error("task already registered: {0}")]
    DuplicateTask(TaskId),

    #[error("{assignee_id} is not assigned to {task_id}")]
    NotAssigned {
        task_id: TaskId,
        assignee_id: AssigneeId,
    },

    #[error("{assignee_id} has no pending claim on {task_id}")]
    NoPendingClaim {
        task_id: TaskId,
        assignee_id: AssigneeId,
    },
}

impl EngineError {
    pub fn invariant(task_id: TaskId, detail: impl Into<String>) -> Self {
        Self::InvariantViolated {
            task_id,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::StorageUnavailable(_) => ErrorKind::Infrastructure,
            EngineError::TaskBusy(_) => ErrorKind::Transient,
            EngineError::ConfigurationInvalid(_)
            | EngineError::InvariantViolated { .. }
            | EngineError::TaskNotFound(_)
            | EngineError::DuplicateTask(_)
            | EngineError::NotAssigned { .. }
            | EngineError::NoPendingClaim { .. } => ErrorKind::Permanent,
        }
    }

    /// Whether the scanner should try the same work again on its next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Infrastructure)
    }
}
