#![allow(dead_code)]

use std::sync::Arc;

use cadence_core::app::{Engine, EngineBuilder, Scanner};
use cadence_core::config::EngineConfig;
use cadence_core::domain::{AssigneeId, DomainEvent, TaskDefinition, TaskId};
use cadence_core::impls::{InMemoryStore, RecordingEventSink};
use cadence_core::ports::FixedClock;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use ulid::Ulid;

pub struct Harness {
    pub engine: Arc<Engine>,
    pub scanner: Scanner,
    pub store: Arc<InMemoryStore>,
    pub events: Arc<RecordingEventSink>,
    pub clock: Arc<FixedClock>,
    pub people: Vec<AssigneeId>,
}

/// 2026-04-10 17:00 UTC; tasks in these tests are due an hour later.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 10, 17, 0, 0).unwrap()
}

pub fn due() -> DateTime<Utc> {
    start() + Duration::hours(1)
}

/// Five minutes past the next UTC midnight.
pub fn after_midnight() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 11, 0, 5, 0).unwrap()
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new(FixedOffset::east_opt(0).unwrap()));
        let events = Arc::new(RecordingEventSink::new());
        let clock = Arc::new(FixedClock::new(start()));
        let engine = EngineBuilder::new()
            .config(EngineConfig::default())
            .task_store(store.clone())
            .stats_sink(store.clone())
            .event_sink(events.clone())
            .clock(clock.clone())
            .build()
            .expect("engine builds");
        let engine = Arc::new(engine);
        let scanner = Scanner::new(engine.clone());
        let people = (1..=3).map(|i| AssigneeId::from_ulid(Ulid(i))).collect();
        Self {
            engine,
            scanner,
            store,
            events,
            clock,
            people,
        }
    }

    pub fn a(&self) -> AssigneeId {
        self.people[0]
    }

    pub fn b(&self) -> AssigneeId {
        self.people[1]
    }

    pub fn c(&self) -> AssigneeId {
        self.people[2]
    }

    /// Task due at `due()` assigned to A, B, C.
    pub fn task(&self, id: u128, edit: impl FnOnce(&mut TaskDefinition)) -> TaskDefinition {
        let task_id = TaskId::from_ulid(Ulid(1000 + id));
        let mut def = TaskDefinition::new(task_id, "chore", self.people.clone());
        def.points = 1.0;
        def.due_date = Some(due());
        edit(&mut def);
        def
    }

    pub async fn register(&self, def: TaskDefinition) -> TaskId {
        let id = def.id;
        self.engine.register_task(def).await.expect("task registers");
        id
    }

    pub fn at(&self, now: DateTime<Utc>) {
        self.clock.set(now);
    }

    pub async fn events_of(&self, kind: &str) -> Vec<DomainEvent> {
        self.events
            .events()
            .await
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }
}
