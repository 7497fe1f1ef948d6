//! Domain model (IDs, axes, cycle state, pure state machines).
//!
//! このモジュールには I/O がありません。すべての関数は値を受け取り値を返します:
//! - 値型: ids, axes, task, cycle, state, events, spec
//! - 純粋関数: resolver, claim_gate, rotation, validation, boundary, approval

pub mod approval;
pub mod axes;
pub mod boundary;
pub mod claim_gate;
pub mod cycle;
pub mod errors;
pub mod events;
pub mod ids;
pub mod resolver;
pub mod rotation;
pub mod spec;
pub mod state;
pub mod task;
pub mod validation;

pub use self::axes::{CompletionMode, OverdueAxis, PendingClaimAxis, Recurrence, TriggerAxis};
pub use self::boundary::{BoundaryStep, Effect, StepPlan};
pub use self::claim_gate::{ClaimDecision, DenyReason, can_claim};
pub use self::cycle::{
    AssigneeCycleState, BoundaryKey, BoundaryProgress, CycleRuntime, RotationHistory,
};
pub use self::errors::{ConfigError, EngineError, ErrorKind, SinkError, StoreError};
pub use self::events::{DomainEvent, MissedReason};
pub use self::ids::{AssigneeId, TaskId};
pub use self::resolver::resolve;
pub use self::spec::{Roster, TaskSpec};
pub use self::state::{CalculatedState, LockReason, Resolution};
pub use self::task::{RotationPointer, TaskDefinition, TaskRecord, TaskSnapshot};
