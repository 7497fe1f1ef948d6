//! Per-task serialization.
//!
//! One async mutex per task id. Operations that mutate a task hold its guard
//! for their whole read-modify-write, including a synchronous boundary. The
//! scanner uses `try_lock` and skips tasks that are still busy.
//!
//! Handles are created on first use and dropped by `prune` once no guard or
//! waiter refers to them, so the table stays as large as the set of tasks in
//! flight rather than every id ever seen.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::ids::TaskId;

#[derive(Default)]
pub struct TaskLocks {
    table: Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
}

pub type TaskGuard = OwnedMutexGuard<()>;

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(&self, task_id: TaskId) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().await;
        Arc::clone(table.entry(task_id).or_default())
    }

    pub async fn lock(&self, task_id: TaskId) -> TaskGuard {
        self.handle(task_id).await.lock_owned().await
    }

    /// `None` while another operation holds the task.
    pub async fn try_lock(&self, task_id: TaskId) -> Option<TaskGuard> {
        self.handle(task_id).await.try_lock_owned().ok()
    }

    /// Removes handles only the table still owns. Returns how many went.
    ///
    /// A handle handed out by `handle` is counted until its guard drops, and
    /// `handle` clones under the table lock, so a removed handle has no user.
    pub async fn prune(&self) -> usize {
        let mut table = self.table.lock().await;
        let before = table.len();
        table.retain(|_, handle| Arc::strong_count(handle) > 1);
        before - table.len()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.table.lock().await.len()
    }
}
