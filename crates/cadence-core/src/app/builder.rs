//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - 必須の協調先（TaskStore, StatsSink, EventSink）が欠けていれば build() が失敗する
//! - 設定値も build() 時に検証する
//! - Clock は省略時 SystemClock

use std::sync::Arc;

use super::boundary::Collaborators;
use super::engine::Engine;
use crate::config::EngineConfig;
use crate::domain::errors::ConfigError;
use crate::ports::{Clock, EventSink, StatsSink, SystemClock, TaskStore};

/// EngineBuilder はエンジンを構築
///
/// # 使用例
/// ```ignore
/// let store = Arc::new(InMemoryStore::new(offset));
/// let engine = EngineBuilder::new()
///     .config(config)
///     .task_store(store.clone())
///     .stats_sink(store)
///     .event_sink(Arc::new(TracingEventSink))
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn TaskStore>>,
    stats: Option<Arc<dyn StatsSink>>,
    events: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
}

/// BuildError はエンジン構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These collaborators must be provided before build().")]
    MissingComponents(Vec<&'static str>),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn stats_sink(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// # 検証
    /// - 必須の協調先がすべて設定されているか
    /// - 設定値（UTC オフセットなど）が有効か
    pub fn build(self) -> Result<Engine, BuildError> {
        let mut missing = Vec::new();
        if self.store.is_none() {
            missing.push("task_store");
        }
        if self.stats.is_none() {
            missing.push("stats_sink");
        }
        if self.events.is_none() {
            missing.push("event_sink");
        }
        let (Some(store), Some(stats), Some(events)) = (self.store, self.stats, self.events) else {
            return Err(BuildError::MissingComponents(missing));
        };

        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let collaborators = Collaborators {
            store,
            stats,
            events,
        };
        Ok(Engine::new(collaborators, clock, self.config)?)
    }
}
