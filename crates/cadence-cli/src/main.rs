//! cadence - household task engine simulator
//!
//! - `cadence validate <file>`: シナリオファイルを読み込み、全タスクを検証する
//! - `cadence simulate <file> --hours N`: 模擬時計でスクリプトを再生し、
//!   イベントを JSON lines で標準出力に書く

mod output;
mod scenario;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_core::app::{EngineBuilder, Scanner};
use cadence_core::domain::{EngineError, TaskId};
use cadence_core::impls::{FanoutEventSink, InMemoryStore, TracingEventSink};
use cadence_core::ports::{EventSink, FixedClock, UlidGenerator};
use cadence_core::Engine;
use chrono::Duration;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use self::output::{JsonLinesEventSink, emit_line};
use self::scenario::{Action, Prepared, Scenario, ScriptedAction};

#[derive(Parser)]
#[command(name = "cadence", version, about = "Recurring household task engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a scenario file without running it.
    Validate { file: PathBuf },

    /// Replay a scenario against a simulated clock.
    Simulate {
        file: PathBuf,

        /// Simulated time span, starting at the scenario's `start`.
        #[arg(long, default_value_t = 48, env = "CADENCE_SIM_HOURS")]
        hours: u32,

        /// Also log events through tracing.
        #[arg(long)]
        trace_events: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { file } => validate(file),
        Command::Simulate {
            file,
            hours,
            trace_events,
        } => simulate(file, hours, trace_events).await,
    }
}

fn validate(file: PathBuf) -> Result<()> {
    let scenario = Scenario::load(&file)?;
    let ids = UlidGenerator::new(FixedClock::new(scenario.start));
    let prepared = scenario.prepare(&ids)?;
    info!(
        tasks = prepared.tasks.len(),
        assignees = prepared.roster.len(),
        actions = prepared.actions.len(),
        "scenario is valid"
    );
    Ok(())
}

async fn simulate(file: PathBuf, hours: u32, trace_events: bool) -> Result<()> {
    let scenario = Scenario::load(&file)?;
    let clock = Arc::new(FixedClock::new(scenario.start));
    let prepared = scenario.prepare(&UlidGenerator::new(clock.clone()))?;

    let offset = prepared.engine.utc_offset()?;
    let store = Arc::new(InMemoryStore::new(offset));
    let mut sinks: Vec<Arc<dyn EventSink>> =
        vec![Arc::new(JsonLinesEventSink::new(clock.clone()))];
    if trace_events {
        sinks.push(Arc::new(TracingEventSink));
    }
    let engine = Arc::new(
        EngineBuilder::new()
            .config(prepared.engine.clone())
            .task_store(store.clone())
            .stats_sink(store.clone())
            .event_sink(Arc::new(FanoutEventSink::new(sinks)))
            .clock(clock.clone())
            .build()?,
    );
    let scanner = Scanner::new(engine.clone());

    let Prepared {
        start,
        engine: config,
        roster,
        tasks,
        task_ids,
        actions,
    } = prepared;

    for def in tasks {
        engine.register_task(def).await?;
    }

    let step = Duration::from_std(config.scan_interval()).context("scan interval out of range")?;
    let end = start + Duration::hours(i64::from(hours));
    let mut pending = actions.into_iter().peekable();
    let mut now = start;
    info!(%start, %end, step_secs = step.num_seconds(), "simulation started");

    while now <= end {
        while let Some(action) = pending.next_if(|a| a.at <= now) {
            clock.set(action.at);
            let task_id = task_ids[&action.task];
            let assignee = action.action.assignee().map(|n| roster.id_of(n)).transpose()?;
            match apply(&engine, task_id, assignee, &action).await {
                Ok(result) => emit_line(&json!({
                    "at": action.at,
                    "action": action.action.name(),
                    "task": action.task,
                    "assignee": action.action.assignee(),
                    "result": result,
                }))?,
                Err(e) if e.is_retryable() => return Err(e.into()),
                Err(e) => warn!(
                    task = %action.task,
                    action = action.action.name(),
                    error = %e,
                    "action rejected"
                ),
            }
        }

        clock.set(now);
        let report = scanner.scan_once().await?;
        if !report.is_clean() {
            warn!(failures = ?report.failures, "scan reported failures");
        }
        now += step;
    }

    for (name, task_id) in &task_ids {
        let status = engine.status(*task_id).await?;
        emit_line(&json!({ "task": name, "status": status }))?;
    }
    for (day, totals) in store.daily_totals().await {
        emit_line(&json!({ "day": day, "totals": totals }))?;
    }
    info!(
        approvals = store.approvals().await.len(),
        misses = store.misses().await.len(),
        "simulation finished"
    );
    Ok(())
}

async fn apply(
    engine: &Engine,
    task_id: TaskId,
    assignee: Option<cadence_core::domain::AssigneeId>,
    scripted: &ScriptedAction,
) -> Result<serde_json::Value, EngineError> {
    let value = match (&scripted.action, assignee) {
        (Action::Claim { .. }, Some(who)) => json!(engine.claim(task_id, who).await?),
        (Action::Approve { .. }, Some(who)) => json!(engine.approve(task_id, who).await?.boundary),
        (Action::Disapprove { .. }, Some(who)) => {
            engine.disapprove(task_id, who).await?;
            json!("disapproved")
        }
        (Action::Reset, _) => json!(engine.reset_task(task_id).await?),
        (Action::Override { active }, _) => {
            engine.set_rotation_override(task_id, *active).await?;
            json!({ "override_active": active })
        }
        (_, None) => json!(null),
    };
    Ok(value)
}
