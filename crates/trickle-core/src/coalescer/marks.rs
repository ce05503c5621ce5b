//! MarkTable - target ごとの dedupe mark とロック状態のサイドテーブル
//!
//! UI 要素に属性として貼る代わりに coalescer が所有します。
//! DOM なしでテストできるのが目的です。

use std::collections::HashMap;

use crate::domain::{BindOptions, Target, TargetKey, TargetMark, TargetState, WorkItem};

/// What `MarkTable::admit` decided for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Redundant submission, nothing changed.
    Skipped,
    /// A queued item for the same target now carries the new options.
    Superseded,
    /// The target was locked and must be pushed onto the pending queue.
    Enqueue,
}

#[derive(Debug, Default)]
pub struct MarkTable {
    marks: HashMap<TargetKey, TargetMark>,
}

impl MarkTable {
    pub fn state_of(&self, key: &TargetKey) -> TargetState {
        self.marks
            .get(key)
            .map(|mark| mark.state)
            .unwrap_or_default()
    }

    pub fn timestamp_of(&self, key: &TargetKey) -> Option<u64> {
        self.marks.get(key).and_then(|mark| mark.timestamp)
    }

    /// Record a submission for `target`.
    pub fn admit(
        &mut self,
        target: Target,
        timestamp: Option<u64>,
        options: BindOptions,
    ) -> Admission {
        let mark = self.marks.entry(target.key.clone()).or_default();
        if mark.is_redundant(timestamp) {
            return Admission::Skipped;
        }
        if timestamp.is_some() {
            mark.timestamp = timestamp;
        }

        let work = WorkItem { target, options };
        match mark.queued.as_mut() {
            Some(queued) => {
                *queued = work;
                Admission::Superseded
            }
            None => {
                mark.state = TargetState::Locked;
                mark.queued = Some(work);
                Admission::Enqueue
            }
        }
    }

    /// Take the queued work for `key` when processing starts.
    ///
    /// The target stays `Locked` until `finish` is called.
    pub fn take(&mut self, key: &TargetKey) -> Option<WorkItem> {
        self.marks.get_mut(key).and_then(|mark| mark.queued.take())
    }

    /// Record the result of processing.
    ///
    /// A target re-queued while its effect was running stays `Locked`.
    pub fn finish(&mut self, key: &TargetKey, bound: bool) {
        if let Some(mark) = self.marks.get_mut(key)
            && mark.queued.is_none()
        {
            mark.state = if bound {
                TargetState::Bound
            } else {
                TargetState::Unbound
            };
        }
    }
}
