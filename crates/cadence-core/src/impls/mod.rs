//! Impls - ports の実装
//!
//! 開発・テスト・シミュレーション用のインメモリ実装です。

pub mod event_sinks;
pub mod inmem_store;

pub use self::event_sinks::{FanoutEventSink, RecordingEventSink, TracingEventSink};
pub use self::inmem_store::{DailyTotals, InMemoryStore};
