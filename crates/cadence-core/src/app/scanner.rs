//! Scanner - 定期スキャン
//!
//! 1 回のスキャンで全タスクを並列に処理します（`max_parallel_tasks` で上限）。
//! 前回の処理が終わっていないタスクは `TaskBusy` としてスキップし、
//! 次のティックで再び拾います。
//! ティックの最後に、誰も使っていないタスクロックを表から外します。
//!
//! `ScannerHandle` は `watch` チャネルで停止を伝えます:
//! - `request_shutdown()` で停止要求
//! - `shutdown_and_join()` で停止を待つ

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::engine::Engine;
use super::status::{ScanFailure, ScanReport};
use crate::domain::errors::EngineError;

pub struct Scanner {
    engine: Arc<Engine>,
    max_parallel: usize,
}

impl Scanner {
    pub fn new(engine: Arc<Engine>) -> Self {
        let max_parallel = engine.config().max_parallel_tasks.max(1);
        Self {
            engine,
            max_parallel,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// One tick over every task.
    ///
    /// Only a failure to list tasks aborts the tick; per-task failures are
    /// reported in `ScanReport::failures`.
    pub async fn scan_once(&self) -> Result<ScanReport, EngineError> {
        let task_ids = self.engine.task_ids().await?;
        let permits = Arc::new(Semaphore::new(self.max_parallel));
        let mut set = JoinSet::new();

        for task_id in task_ids {
            let engine = Arc::clone(&self.engine);
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (task_id, Err(EngineError::TaskBusy(task_id)));
                };
                (task_id, engine.try_scan_task(task_id).await)
            });
        }

        let mut report = ScanReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.record(&outcome),
                Ok((task_id, Err(EngineError::TaskBusy(_)))) => {
                    debug!(task_id = %task_id, "task busy, skipped");
                    report.skipped_busy += 1;
                }
                Ok((task_id, Err(e))) => {
                    let retryable = e.is_retryable();
                    if retryable {
                        warn!(task_id = %task_id, error = %e, "scan failed, will retry");
                    } else {
                        error!(task_id = %task_id, error = %e, "scan failed");
                    }
                    report.failures.push(ScanFailure {
                        task_id,
                        error: e.to_string(),
                        retryable,
                    });
                }
                Err(e) => error!(error = %e, "scan task panicked"),
            }
        }

        let pruned = self.engine.prune_locks().await;
        if pruned > 0 {
            debug!(pruned, "idle task locks dropped");
        }
        Ok(report)
    }

    /// Runs `scan_once` every `interval` until shutdown.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> ScannerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_ms = interval.as_millis() as u64, "scanner started");
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // sender dropped or shutdown requested
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match self.scan_once().await {
                            Ok(report) if report.is_clean() => debug!(?report, "scan finished"),
                            Ok(report) => {
                                let failures = report.failures.len();
                                warn!(failures, "scan finished with failures");
                            }
                            Err(e) => warn!(error = %e, "scan aborted"),
                        }
                    }
                }
            }
            info!("scanner stopped");
        });
        ScannerHandle { shutdown_tx, join }
    }
}

/// Scanner handle.
/// - `shutdown_tx` を drop するとスキャナが止まる
/// - `shutdown_and_join()` で実行中のティックの終了を待てる
pub struct ScannerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ScannerHandle {
    /// In-flight ticks finish; no new tick starts.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}
