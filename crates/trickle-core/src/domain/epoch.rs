//! Epoch - 完了シグナルの単位
//!
//! Epoch は backlog が 0 → 非 0 になってから 0 に戻るまでの期間です。
//! 各 epoch の結果は `EpochOutcome` として購読者に一度だけ通知されます。

use serde::{Deserialize, Serialize};

/// How an epoch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EpochOutcome {
    /// Backlog returned to zero naturally.
    Drained { epoch: u64, watermark: usize },
    /// `cancel_epoch` was called before the backlog drained.
    Cancelled { epoch: u64, watermark: usize },
}

impl EpochOutcome {
    pub fn epoch(&self) -> u64 {
        match self {
            EpochOutcome::Drained { epoch, .. } | EpochOutcome::Cancelled { epoch, .. } => *epoch,
        }
    }

    pub fn watermark(&self) -> usize {
        match self {
            EpochOutcome::Drained { watermark, .. }
            | EpochOutcome::Cancelled { watermark, .. } => *watermark,
        }
    }
}
