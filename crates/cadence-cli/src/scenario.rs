//! Scenario file: people, tasks and a script of actions replayed against a
//! simulated clock.
//!
//! ```toml
//! start = "2026-04-10T17:00:00Z"
//! assignees = ["aki", "ben", "cho"]
//!
//! [engine]
//! scan_interval_secs = 900
//!
//! [[tasks]]
//! name = "dishes"
//! assignees = ["aki", "ben", "cho"]
//! completion = "rotation_round_robin"
//!
//! [[actions]]
//! at = "2026-04-10T18:30:00Z"
//! task = "dishes"
//! action = "claim"
//! assignee = "cho"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use cadence_core::EngineConfig;
use cadence_core::domain::{Roster, TaskDefinition, TaskId, TaskSpec};
use cadence_core::ports::IdGenerator;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub start: DateTime<Utc>,

    #[serde(default)]
    pub engine: EngineConfig,

    pub assignees: Vec<String>,

    #[serde(default)]
    pub tasks: Vec<TaskSpec>,

    #[serde(default)]
    pub actions: Vec<ScriptedAction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedAction {
    pub at: DateTime<Utc>,
    pub task: String,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Claim { assignee: String },
    Approve { assignee: String },
    Disapprove { assignee: String },
    Reset,
    Override { active: bool },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Claim { .. } => "claim",
            Action::Approve { .. } => "approve",
            Action::Disapprove { .. } => "disapprove",
            Action::Reset => "reset",
            Action::Override { .. } => "override",
        }
    }

    pub fn assignee(&self) -> Option<&str> {
        match self {
            Action::Claim { assignee }
            | Action::Approve { assignee }
            | Action::Disapprove { assignee } => Some(assignee),
            Action::Reset | Action::Override { .. } => None,
        }
    }
}

/// Scenario with names resolved to ids and every task validated.
pub struct Prepared {
    pub start: DateTime<Utc>,
    pub engine: EngineConfig,
    pub roster: Roster,
    pub tasks: Vec<TaskDefinition>,
    pub task_ids: BTreeMap<String, TaskId>,
    pub actions: Vec<ScriptedAction>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn prepare(self, ids: &dyn IdGenerator) -> Result<Prepared> {
        self.engine.validate().context("[engine]")?;

        let mut roster = Roster::new();
        for name in &self.assignees {
            roster.insert(name.clone(), ids.generate_assignee_id())?;
        }

        let mut tasks = Vec::with_capacity(self.tasks.len());
        let mut task_ids = BTreeMap::new();
        for spec in self.tasks {
            let name = spec.name.clone();
            let id = ids.generate_task_id();
            if task_ids.insert(name.clone(), id).is_some() {
                bail!("task {name:?} is defined twice");
            }
            let def = spec
                .into_definition(id, &roster)
                .with_context(|| format!("task {name:?}"))?;
            tasks.push(def);
        }

        let mut actions = self.actions;
        for action in &actions {
            if !task_ids.contains_key(&action.task) {
                bail!("action at {} refers to unknown task {:?}", action.at, action.task);
            }
            if let Some(name) = action.action.assignee() {
                roster.id_of(name).with_context(|| format!("action at {}", action.at))?;
            }
            if action.at < self.start {
                bail!("action at {} is before the scenario start", action.at);
            }
        }
        actions.sort_by_key(|a| a.at);

        Ok(Prepared {
            start: self.start,
            engine: self.engine,
            roster,
            tasks,
            task_ids,
            actions,
        })
    }
}
