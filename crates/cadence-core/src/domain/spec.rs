//! Input specs for cadence (task files).
//!
//! `TaskSpec` is the serde-facing description of a task: assignees by name,
//! window in minutes, everything optional that has a sensible default. It
//! becomes a `TaskDefinition` only through `into_definition`, which resolves
//! names against a `Roster` and runs validation.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::axes::{CompletionMode, OverdueAxis, PendingClaimAxis, Recurrence, TriggerAxis};
use super::errors::ConfigError;
use super::ids::{AssigneeId, TaskId};
use super::task::TaskDefinition;
use super::validation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    pub name: String,

    #[serde(default)]
    pub points: f64,

    #[serde(default = "default_trigger")]
    pub trigger: TriggerAxis,

    #[serde(default = "default_overdue")]
    pub overdue: OverdueAxis,

    #[serde(default)]
    pub pending_claim: PendingClaimAxis,

    /// RFC 3339 instant, e.g. `"2026-04-10T18:00:00Z"`.
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,

    #[serde(default)]
    pub due_window_minutes: Option<i64>,

    #[serde(default)]
    pub recurrence: Recurrence,

    pub assignees: Vec<String>,

    #[serde(default)]
    pub completion: CompletionMode,
}

fn default_trigger() -> TriggerAxis {
    TriggerAxis::MidnightOnce
}

fn default_overdue() -> OverdueAxis {
    OverdueAxis::Never
}

impl TaskSpec {
    /// Resolves assignee names and validates the result.
    pub fn into_definition(
        self,
        id: TaskId,
        roster: &Roster,
    ) -> Result<TaskDefinition, ConfigError> {
        let assignees = self
            .assignees
            .iter()
            .map(|name| roster.id_of(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut def = TaskDefinition::new(id, self.name, assignees);
        def.points = self.points;
        def.trigger = self.trigger;
        def.overdue = self.overdue;
        def.pending_claim = self.pending_claim;
        def.due_date = self.due;
        def.due_window = self
            .due_window_minutes
            .map(|m| Duration::try_minutes(m).ok_or(ConfigError::WindowOutOfRange))
            .transpose()?;
        def.recurrence = self.recurrence;
        def.completion = self.completion;
        validation::normalize(def)
    }
}

/// Name ↔ id table for the people a task file refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    by_name: BTreeMap<String, AssigneeId>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, id: AssigneeId) -> Result<(), ConfigError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(ConfigError::DuplicateName(name));
        }
        self.by_name.insert(name, id);
        Ok(())
    }

    pub fn id_of(&self, name: &str) -> Result<AssigneeId, ConfigError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownAssignee(name.to_string()))
    }

    pub fn name_of(&self, id: AssigneeId) -> Option<&str> {
        self.by_name
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn roster() -> Roster {
        let mut r = Roster::new();
        for (i, name) in ["aki", "ben", "cho"].into_iter().enumerate() {
            r.insert(name, AssigneeId::from_ulid(Ulid(i as u128 + 1))).unwrap();
        }
        r
    }

    #[test]
    fn parses_minimal_spec_with_defaults() {
        let spec: TaskSpec = toml::from_str(
            r#"
            name = "water plants"
            assignees = ["aki", "ben"]
            "#,
        )
        .unwrap();
        assert_eq!(spec.trigger, TriggerAxis::MidnightOnce);
        assert_eq!(spec.overdue, OverdueAxis::Never);
        assert_eq!(spec.recurrence, Recurrence::None);

        let def = spec.into_definition(TaskId::from_ulid(Ulid(9)), &roster()).unwrap();
        assert_eq!(def.assignees.len(), 2);
        assert_eq!(def.completion, CompletionMode::Independent);
    }

    #[test]
    fn parses_full_rotation_spec() {
        let spec: TaskSpec = toml::from_str(
            r#"
            name = "take out trash"
            points = 2.5
            trigger = "midnight_once"
            overdue = "allow_steal"
            pending_claim = "auto_approve"
            due = "2026-04-10T18:00:00Z"
            due_window_minutes = 120
            recurrence = { every = "days", count = 2 }
            assignees = ["aki", "ben", "cho"]
            completion = "rotation_round_robin"
            "#,
        )
        .unwrap();
        let r = roster();
        let def = spec.into_definition(TaskId::from_ulid(Ulid(9)), &r).unwrap();
        assert_eq!(def.recurrence, Recurrence::Days { count: 2 });
        assert_eq!(def.due_window, Some(Duration::hours(2)));
        assert_eq!(def.rotation.turn, Some(r.id_of("aki").unwrap()));
    }

    #[test]
    fn unknown_names_and_bad_axes_are_rejected() {
        let spec = TaskSpec {
            name: "mop".into(),
            points: 1.0,
            trigger: TriggerAxis::OnApproval,
            overdue: OverdueAxis::ClearAtReset,
            pending_claim: PendingClaimAxis::Hold,
            due: None,
            due_window_minutes: None,
            recurrence: Recurrence::None,
            assignees: vec!["aki".into()],
            completion: CompletionMode::Independent,
        };
        let id = TaskId::from_ulid(Ulid(9));
        assert!(matches!(
            spec.clone().into_definition(id, &roster()),
            Err(ConfigError::IncompatibleAxes { .. })
        ));

        let mut stranger = spec;
        stranger.overdue = OverdueAxis::Never;
        stranger.assignees.push("dee".into());
        assert_eq!(
            stranger.into_definition(id, &roster()),
            Err(ConfigError::UnknownAssignee("dee".into()))
        );
    }

    #[test]
    fn oversized_window_is_a_config_error() {
        let spec: TaskSpec = toml::from_str(
            r#"
            name = "defrost freezer"
            due = "2026-04-10T18:00:00Z"
            due_window_minutes = 9223372036854775807
            assignees = ["aki"]
            "#,
        )
        .unwrap();
        assert_eq!(
            spec.into_definition(TaskId::from_ulid(Ulid(9)), &roster()),
            Err(ConfigError::WindowOutOfRange)
        );
    }

    #[test]
    fn roster_rejects_duplicate_names() {
        let mut r = roster();
        assert_eq!(
            r.insert("aki", AssigneeId::from_ulid(Ulid(50))),
            Err(ConfigError::DuplicateName("aki".into()))
        );
        assert_eq!(r.name_of(AssigneeId::from_ulid(Ulid(2))), Some("ben"));
    }
}
