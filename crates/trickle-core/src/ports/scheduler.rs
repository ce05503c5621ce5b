//! Scheduler port - 単発タイマーの抽象化
//!
//! coalescer は `defer` だけを使って処理を呼び出しスタックから切り離します。
//! 実装を差し替えることで、テストでは仮想時間で決定的に実行できます。
//!
//! # 実装
//! - **TokioScheduler**: tokio ランタイム上の本番用
//! - **ManualScheduler**: テスト用（`run_next` / `run_until_idle` で手動実行）

use std::time::Duration;

/// A job handed to the scheduler.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Run `job` once, no sooner than `delay` from now and never synchronously
    /// inside this call.
    fn defer(&self, delay: Duration, job: Job);
}
