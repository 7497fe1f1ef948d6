//! cadence-core
//!
//! Core building blocks for the cadence recurring-task engine.
//!
//! # モジュール構成
//! - **domain**: ドメインモデルと純粋関数（axes, resolver, claim_gate, rotation, boundary, validation）
//! - **ports**: 抽象化レイヤー（TaskStore, StatsSink, EventSink, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（EngineBuilder, Engine, Scanner）
//! - **impls**: 実装（InMemoryStore, RecordingEventSink など開発用）
//! - **config**: エンジン設定（TOML）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{Engine, EngineBuilder, Scanner};
pub use config::EngineConfig;
