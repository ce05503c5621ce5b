//! TokioScheduler - tokio ランタイム上の本番用スケジューラ

use std::time::Duration;

use tokio::runtime::Handle;

use crate::ports::{Job, Scheduler};

/// Spawns each deferred job as a tokio task.
///
/// The handle is captured at construction so `defer` also works from
/// threads outside the runtime (e.g. inside an effect callback).
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Capture the current runtime. Must be called inside a tokio context.
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn defer(&self, delay: Duration, job: Job) {
        self.handle.spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            job();
        });
    }
}
