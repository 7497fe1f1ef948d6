//! App - アプリケーション層
//!
//! このモジュールは、ports と純粋なドメイン関数を組み合わせて
//! アプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: エンジンの構築とワイヤリング
//! - **Engine**: 登録・クレーム・承認・リセットなどの操作
//! - **BoundaryProcessor**: 境界シーケンスの実行（boundary.rs）
//! - **Scanner**: 定期スキャンと停止ハンドル
//! - **TaskLocks**: タスクごとの排他制御

pub mod boundary;
pub mod builder;
pub mod engine;
pub mod locks;
pub mod scanner;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, EngineBuilder};
pub use self::engine::{ApprovalReceipt, Engine};
pub use self::locks::TaskLocks;
pub use self::scanner::{Scanner, ScannerHandle};
pub use self::status::{
    AssigneeStatus, BoundaryRun, ScanFailure, ScanOutcome, ScanReport, TaskStatus,
};
