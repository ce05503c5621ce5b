//! Task coalescer: dedupe, deferred chunked processing, epoch completion.
//!
//! # フロー
//! 1. `submit` で target をロックし、pending キューへ積む（呼び出し元はブロックしない）
//! 2. epoch の最初の 1 件で `initial_delay` 後の chunk 実行を予約
//! 3. 1 回の chunk で最大 `chunk_size` 件を処理し、残りがあれば 0 遅延で次を予約
//! 4. backlog が 0 に戻ったら購読者に watermark を通知して次の epoch へ
//!
//! # ロック
//! 状態は `std::sync::Mutex` の中にあり、effect 呼び出しの間は保持しません。
//! effect の中から `submit` しても pending キューが伸びるだけで再帰しません。

mod backlog;
mod epoch;
mod marks;

pub use backlog::Backlog;
pub use epoch::{EpochSignal, EpochWaiter};
pub use marks::{Admission, MarkTable};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{BindOptions, SubmitOptions, Target, TargetKey, TargetState, WorkItem};
use crate::ports::{Scheduler, TargetEffect};

/// Coalescer tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescerConfig {
    /// Maximum items processed per scheduler job.
    pub chunk_size: usize,
    /// Delay before the first chunk of a fresh epoch.
    pub initial_delay: Duration,
    /// Prefix of classes that carry per-target overrides.
    pub class_prefix: String,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            initial_delay: Duration::from_millis(10),
            class_prefix: "tooltip-".to_string(),
        }
    }
}

/// Result of one `submit` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReport {
    pub queued: usize,
    pub skipped: usize,
    pub superseded: usize,
}

/// Counters for status views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalescerStats {
    pub epoch: u64,
    pub backlog: usize,
    pub watermark: usize,
    pub pending: usize,
    pub submitted: u64,
    pub skipped: u64,
    pub superseded: u64,
    pub processed: u64,
    pub failures: u64,
}

struct CoalescerState {
    marks: MarkTable,
    pending: VecDeque<TargetKey>,
    backlog: Backlog,
    signal: EpochSignal,
    drain_scheduled: bool,
    stats: CoalescerStats,
}

impl CoalescerState {
    fn new() -> Self {
        Self {
            marks: MarkTable::default(),
            pending: VecDeque::new(),
            backlog: Backlog::default(),
            signal: EpochSignal::default(),
            drain_scheduled: false,
            stats: CoalescerStats::default(),
        }
    }
}

struct Inner<E> {
    effect: E,
    scheduler: Arc<dyn Scheduler>,
    config: CoalescerConfig,
    defaults: BindOptions,
    state: Mutex<CoalescerState>,
}

/// Accepts UI work without blocking and applies it in bounded chunks.
///
/// Cloning is cheap; clones share the same queue, marks and epoch.
pub struct TaskCoalescer<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for TaskCoalescer<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: TargetEffect> TaskCoalescer<E> {
    pub fn new(
        effect: E,
        scheduler: Arc<dyn Scheduler>,
        config: CoalescerConfig,
        defaults: BindOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                effect,
                scheduler,
                config,
                defaults,
                state: Mutex::new(CoalescerState::new()),
            }),
        }
    }

    pub fn effect(&self) -> &E {
        &self.inner.effect
    }

    pub fn config(&self) -> &CoalescerConfig {
        &self.inner.config
    }

    /// Queue `targets` for binding with `options` merged over the defaults.
    pub fn submit<I>(&self, targets: I, options: SubmitOptions) -> SubmitReport
    where
        I: IntoIterator,
        I::Item: Into<Target>,
    {
        let merged = BindOptions::merged(&self.inner.defaults, &options);
        let mut report = SubmitReport::default();
        let mut schedule = None;
        {
            let mut state = self.inner.lock();
            for target in targets {
                let target = target.into();
                state.stats.submitted += 1;
                let key = target.key.clone();
                match state.marks.admit(target, options.timestamp, merged.clone()) {
                    Admission::Skipped => {
                        state.stats.skipped += 1;
                        report.skipped += 1;
                    }
                    Admission::Superseded => {
                        state.stats.superseded += 1;
                        report.superseded += 1;
                    }
                    Admission::Enqueue => {
                        let fresh_epoch = state.backlog.is_idle();
                        state.pending.push_back(key);
                        state.backlog.increment();
                        report.queued += 1;
                        if !state.drain_scheduled {
                            state.drain_scheduled = true;
                            schedule = Some(if fresh_epoch {
                                self.inner.config.initial_delay
                            } else {
                                Duration::ZERO
                            });
                        }
                    }
                }
            }
        }
        if let Some(delay) = schedule {
            debug!(?delay, "scheduling first chunk");
            Inner::schedule_chunk(&self.inner, delay);
        }
        debug!(
            queued = report.queued,
            skipped = report.skipped,
            superseded = report.superseded,
            "submitted"
        );
        report
    }

    /// Reject current subscribers and reset the watermark.
    ///
    /// Only observers are affected; already-queued work still runs.
    pub fn cancel_epoch(&self) -> usize {
        let mut state = self.inner.lock();
        let watermark = state.backlog.reset_watermark();
        let outcome = state.signal.cancelled(watermark);
        info!(epoch = outcome.epoch(), watermark, "epoch cancelled");
        watermark
    }

    /// Waiter for the end of the current epoch.
    pub fn subscribe(&self) -> EpochWaiter {
        self.inner.lock().signal.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.lock().signal.epoch()
    }

    pub fn state_of(&self, key: &TargetKey) -> TargetState {
        self.inner.lock().marks.state_of(key)
    }

    pub fn stats(&self) -> CoalescerStats {
        let state = self.inner.lock();
        CoalescerStats {
            epoch: state.signal.epoch(),
            backlog: state.backlog.current(),
            watermark: state.backlog.high_water(),
            pending: state.pending.len(),
            ..state.stats.clone()
        }
    }
}

impl<E: TargetEffect> Inner<E> {
    fn lock(&self) -> MutexGuard<'_, CoalescerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn schedule_chunk(this: &Arc<Self>, delay: Duration) {
        let inner = Arc::clone(this);
        this.scheduler
            .defer(delay, Box::new(move || Inner::run_chunk(&inner)));
    }

    /// Process at most `chunk_size` items, then yield.
    fn run_chunk(this: &Arc<Self>) {
        for _ in 0..this.config.chunk_size.max(1) {
            if !this.process_next() {
                break;
            }
        }

        let more = {
            let mut state = this.lock();
            if state.pending.is_empty() {
                state.drain_scheduled = false;
                false
            } else {
                true
            }
        };
        if more {
            Inner::schedule_chunk(this, Duration::ZERO);
        }
    }

    /// Returns `false` when the pending queue is empty.
    fn process_next(&self) -> bool {
        let (key, work) = {
            let mut state = self.lock();
            let Some(key) = state.pending.pop_front() else {
                return false;
            };
            let work = state.marks.take(&key);
            (key, work)
        };

        let bound = work.is_some_and(|work| self.apply(work));

        let mut state = self.lock();
        state.marks.finish(&key, bound);
        if bound {
            state.stats.processed += 1;
        } else {
            state.stats.failures += 1;
        }
        if let Some(watermark) = state.backlog.decrement() {
            let outcome = state.signal.drained(watermark);
            info!(epoch = outcome.epoch(), watermark, "epoch drained");
        }
        true
    }

    /// Unbind if needed, then bind. Effect errors are logged, never raised.
    fn apply(&self, work: WorkItem) -> bool {
        let WorkItem { target, options } = work;
        let options = options.with_class_overrides(&target.classes, &self.config.class_prefix);

        if self.effect.is_bound(&target)
            && let Err(err) = self.effect.unbind(&target)
        {
            warn!(target_key = %target.key, error = %err, "unbind failed");
        }
        match self.effect.bind(&target, &options) {
            Ok(()) => true,
            Err(err) => {
                warn!(target_key = %target.key, error = %err, "bind failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EffectError, EpochOutcome, Placement, TrickleError};
    use crate::impls::ManualScheduler;
    use crate::testing::RecordingEffect;

    fn coalescer(
        chunk_size: usize,
    ) -> (
        TaskCoalescer<Arc<RecordingEffect>>,
        Arc<RecordingEffect>,
        Arc<ManualScheduler>,
    ) {
        let effect = Arc::new(RecordingEffect::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let config = CoalescerConfig {
            chunk_size,
            ..CoalescerConfig::default()
        };
        let coalescer = TaskCoalescer::new(
            Arc::clone(&effect),
            scheduler.clone(),
            config,
            BindOptions::default(),
        );
        (coalescer, effect, scheduler)
    }

    fn targets(n: usize) -> Vec<Target> {
        (0..n).map(|i| Target::new(format!("t{i}").as_str())).collect()
    }

    #[test]
    fn submit_never_runs_effects_synchronously() {
        let (coalescer, effect, scheduler) = coalescer(10);
        coalescer.submit(targets(3), SubmitOptions::default());

        assert_eq!(effect.binds(), 0);
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(coalescer.state_of(&"t0".into()), TargetState::Locked);
    }

    #[test]
    fn same_timestamp_twice_binds_once() {
        let (coalescer, effect, scheduler) = coalescer(10);
        let options = SubmitOptions::default().with_timestamp(5);

        let first = coalescer.submit([Target::new("T")], options.clone());
        let second = coalescer.submit([Target::new("T")], options);
        scheduler.run_until_idle();

        assert_eq!(first.queued, 1);
        assert_eq!(second.skipped, 1);
        assert_eq!(effect.binds(), 1);
        assert_eq!(coalescer.stats().skipped, 1);
        assert_eq!(coalescer.state_of(&"T".into()), TargetState::Bound);
    }

    #[test]
    fn same_timestamp_after_processing_is_still_skipped() {
        let (coalescer, effect, scheduler) = coalescer(10);
        let options = SubmitOptions::default().with_timestamp(5);

        coalescer.submit([Target::new("T")], options.clone());
        scheduler.run_until_idle();
        coalescer.submit([Target::new("T")], options);
        scheduler.run_until_idle();

        assert_eq!(effect.binds(), 1);
    }

    #[tokio::test]
    async fn twenty_five_targets_in_chunks_of_ten() {
        let (coalescer, effect, scheduler) = coalescer(10);
        let waiter = coalescer.subscribe();

        coalescer.submit(targets(25), SubmitOptions::default());
        assert_eq!(coalescer.stats().watermark, 25);

        let jobs = scheduler.run_until_idle();

        assert_eq!(jobs, 3);
        assert_eq!(effect.binds(), 25);
        assert_eq!(waiter.wait().await, Ok(25));
        assert_eq!(coalescer.stats().watermark, 0);
        assert_eq!(coalescer.epoch(), 1);
    }

    #[rstest::rstest]
    #[case(1)]
    #[case(4)]
    #[case(10)]
    #[case(64)]
    fn watermark_equals_synchronously_queued_count(#[case] chunk_size: usize) {
        let (coalescer, _effect, scheduler) = coalescer(chunk_size);
        let mut waiter = coalescer.subscribe();

        for target in targets(17) {
            coalescer.submit([target], SubmitOptions::default());
        }
        scheduler.run_until_idle();

        let outcome = waiter.try_outcome().unwrap().unwrap();
        assert_eq!(
            outcome,
            EpochOutcome::Drained {
                epoch: 0,
                watermark: 17
            }
        );
    }

    #[test]
    fn no_frame_processes_more_than_chunk_size() {
        let (coalescer, effect, scheduler) = coalescer(4);
        coalescer.submit(targets(11), SubmitOptions::default());

        let mut per_frame = Vec::new();
        let mut before = effect.binds();
        while scheduler.run_next() {
            let after = effect.binds();
            per_frame.push(after - before);
            before = after;
        }

        assert_eq!(per_frame, vec![4, 4, 3]);
    }

    #[test]
    fn first_chunk_waits_for_initial_delay() {
        let (coalescer, effect, scheduler) = coalescer(10);
        coalescer.submit(targets(1), SubmitOptions::default());

        assert_eq!(
            scheduler.next_due(),
            Some(CoalescerConfig::default().initial_delay)
        );
        scheduler.advance(Duration::from_millis(1));
        assert_eq!(effect.binds(), 0);
        scheduler.advance(CoalescerConfig::default().initial_delay);
        assert_eq!(effect.binds(), 1);
    }

    #[tokio::test]
    async fn cancel_rejects_immediately_and_resets_watermark() {
        let (coalescer, effect, scheduler) = coalescer(10);
        let waiter = coalescer.subscribe();
        coalescer.submit(targets(5), SubmitOptions::default());

        assert_eq!(coalescer.cancel_epoch(), 5);
        assert_eq!(
            waiter.wait().await,
            Err(TrickleError::EpochCancelled {
                epoch: 0,
                watermark: 5
            })
        );
        assert_eq!(coalescer.stats().watermark, 0);

        // 予約済みの chunk はそのまま走る
        let next = coalescer.subscribe();
        scheduler.run_until_idle();
        assert_eq!(effect.binds(), 5);
        assert_eq!(next.wait().await, Ok(0));

        let fresh = coalescer.subscribe();
        coalescer.submit(targets(2), SubmitOptions::default().with_timestamp(9));
        assert_eq!(coalescer.stats().watermark, 2);
        scheduler.run_until_idle();
        assert_eq!(fresh.wait().await, Ok(2));
    }

    #[tokio::test]
    async fn submit_after_cancel_counts_only_new_work() {
        let (coalescer, effect, scheduler) = coalescer(10);
        coalescer.submit(targets(5), SubmitOptions::default());
        coalescer.cancel_epoch();

        let fresh = coalescer.subscribe();
        coalescer.submit(
            [Target::new("late-1"), Target::new("late-2")],
            SubmitOptions::default(),
        );
        assert_eq!(coalescer.stats().watermark, 2);
        assert_eq!(coalescer.stats().backlog, 7);

        scheduler.run_until_idle();
        assert_eq!(effect.binds(), 7);
        assert_eq!(fresh.wait().await, Ok(2));
        assert_eq!(coalescer.stats().watermark, 0);
    }

    #[test]
    fn effect_errors_do_not_stop_the_queue() {
        let (coalescer, effect, scheduler) = coalescer(10);
        effect.fail_on("t1");

        coalescer.submit(targets(3), SubmitOptions::default());
        scheduler.run_until_idle();

        assert_eq!(effect.binds(), 3);
        let stats = coalescer.stats();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(coalescer.state_of(&"t1".into()), TargetState::Unbound);
        assert_eq!(coalescer.state_of(&"t2".into()), TargetState::Bound);
    }

    #[test]
    fn rebinding_tears_down_the_previous_binding() {
        let (coalescer, effect, scheduler) = coalescer(10);

        coalescer.submit([Target::new("T")], SubmitOptions::default().with_timestamp(1));
        scheduler.run_until_idle();
        coalescer.submit([Target::new("T")], SubmitOptions::default().with_timestamp(2));
        scheduler.run_until_idle();

        assert_eq!(effect.binds(), 2);
        assert_eq!(effect.unbinds(), 1);
    }

    #[test]
    fn newer_timestamp_before_processing_supersedes() {
        let (coalescer, effect, scheduler) = coalescer(10);

        coalescer.submit([Target::new("T")], SubmitOptions::default().with_timestamp(1));
        let report = coalescer.submit(
            [Target::new("T")],
            SubmitOptions::default()
                .with_timestamp(2)
                .with_placement(Placement::Bottom),
        );
        scheduler.run_until_idle();

        assert_eq!(report.superseded, 1);
        assert_eq!(effect.binds(), 1);
    }

    /// Submits a follow-up target from inside `bind`.
    struct ReentrantEffect {
        coalescer: Mutex<Option<TaskCoalescer<Arc<ReentrantEffect>>>>,
        binds: Mutex<Vec<String>>,
    }

    impl TargetEffect for Arc<ReentrantEffect> {
        fn bind(&self, target: &Target, _options: &BindOptions) -> Result<(), EffectError> {
            self.binds.lock().unwrap().push(target.key.to_string());
            let coalescer = self.coalescer.lock().unwrap().clone();
            if let Some(coalescer) = coalescer
                && target.key.as_str() == "parent"
            {
                coalescer.submit([Target::new("child")], SubmitOptions::default());
            }
            Ok(())
        }

        fn unbind(&self, _target: &Target) -> Result<(), EffectError> {
            Ok(())
        }

        fn is_bound(&self, _target: &Target) -> bool {
            false
        }
    }

    #[test]
    fn submissions_from_inside_an_effect_are_queued() {
        let effect = Arc::new(ReentrantEffect {
            coalescer: Mutex::new(None),
            binds: Mutex::new(Vec::new()),
        });
        let scheduler = Arc::new(ManualScheduler::new());
        let coalescer = TaskCoalescer::new(
            Arc::clone(&effect),
            scheduler.clone(),
            CoalescerConfig::default(),
            BindOptions::default(),
        );
        *effect.coalescer.lock().unwrap() = Some(coalescer.clone());

        coalescer.submit([Target::new("parent")], SubmitOptions::default());
        scheduler.run_until_idle();

        assert_eq!(*effect.binds.lock().unwrap(), vec!["parent", "child"]);
        // 循環参照を切る
        effect.coalescer.lock().unwrap().take();
    }
}
