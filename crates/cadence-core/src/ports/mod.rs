//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! エンジンは永続化・統計・通知・時刻をすべてここ経由で扱い、
//! 実装の詳細（DB、メッセージング）を知りません。

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod stats_sink;
pub mod task_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::stats_sink::{ApprovalRecord, MissedRecord, StatsSink};
pub use self::task_store::TaskStore;
