//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **TokioScheduler**: 本番用の Scheduler
//! - **ManualScheduler**: テスト用の仮想時間 Scheduler
//! - **HttpTransport**: reqwest による BatchTransport

pub mod http_transport;
pub mod manual_scheduler;
pub mod tokio_scheduler;

// 主要な型を再エクスポート
pub use self::http_transport::HttpTransport;
pub use self::manual_scheduler::ManualScheduler;
pub use self::tokio_scheduler::TokioScheduler;
