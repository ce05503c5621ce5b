//! ManualScheduler - 仮想時間で動くテスト用スケジューラ
//!
//! # 学習ポイント
//! - `defer` はジョブを積むだけで実行しない（呼び出しスタックから切り離す）
//! - `run_next` 1 回 = イベントループ 1 tick として扱える
//! - BinaryHeap + Reverse で (due, seq) の小さい順に取り出す

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;
use std::time::Duration;

use crate::ports::{Job, Scheduler};

struct Entry {
    due: Duration,
    seq: u64,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        (self.due, self.seq) == (other.due, other.seq)
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    queue: BinaryHeap<Reverse<Entry>>,
}

/// Deterministic scheduler driven by the test.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed so far.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of jobs waiting to run.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Due time of the earliest job.
    pub fn next_due(&self) -> Option<Duration> {
        self.lock().queue.peek().map(|Reverse(entry)| entry.due)
    }

    /// Run the earliest job, moving virtual time forward to its due time.
    ///
    /// The lock is released before the job runs so it may `defer` again.
    pub fn run_next(&self) -> bool {
        let job = {
            let mut state = self.lock();
            let Some(Reverse(entry)) = state.queue.pop() else {
                return false;
            };
            state.now = state.now.max(entry.due);
            entry.job
        };
        job();
        true
    }

    /// Run jobs until none are left; returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Move virtual time forward by `by`, running every job that becomes due.
    pub fn advance(&self, by: Duration) -> usize {
        let deadline = self.now() + by;
        let mut ran = 0;
        while self.next_due().is_some_and(|due| due <= deadline) {
            self.run_next();
            ran += 1;
        }
        self.lock().now = deadline;
        ran
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn defer(&self, delay: Duration, job: Job) {
        let mut state = self.lock();
        let entry = Entry {
            due: state.now + delay,
            seq: state.next_seq,
            job,
        };
        state.next_seq += 1;
        state.queue.push(Reverse(entry));
    }
}
