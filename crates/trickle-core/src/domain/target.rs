//! Target - effect を適用する対象
//!
//! Target は呼び出し側が与える不透明なキーで識別されます。
//! coalescer は target を所有せず、処理中だけ参照を保持します。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::options::BindOptions;

/// Caller-supplied stable identifier of a target (e.g. a DOM element id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetKey(String);

impl TargetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TargetKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A target together with the classes that carry per-item overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub key: TargetKey,
    #[serde(default)]
    pub classes: Vec<String>,
}

impl Target {
    pub fn new(key: impl Into<TargetKey>) -> Self {
        Self {
            key: key.into(),
            classes: Vec::new(),
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }
}

impl From<TargetKey> for Target {
    fn from(key: TargetKey) -> Self {
        Self {
            key,
            classes: Vec::new(),
        }
    }
}

/// Per-target binding state.
///
/// State transitions:
/// - Unbound -> Locked -> Bound
/// - Bound -> Locked (new non-duplicate submission)
/// - Locked -> Unbound (bind failed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    #[default]
    Unbound,
    /// Queued or currently being processed.
    Locked,
    Bound,
}

/// Work waiting in the pending queue for one target.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub target: Target,
    pub options: BindOptions,
}

/// Side-table entry for one target (dedupe mark + lock state).
///
/// Marks are monotonic: a newer timestamp supersedes an older one,
/// an equal or older timestamp means "already done".
#[derive(Debug, Clone, Default)]
pub struct TargetMark {
    pub timestamp: Option<u64>,
    pub state: TargetState,
    /// Set while the target sits in the pending queue (not yet processing).
    pub queued: Option<WorkItem>,
}

impl TargetMark {
    /// Is a submission carrying `timestamp` redundant for this target?
    pub fn is_redundant(&self, timestamp: Option<u64>) -> bool {
        match (timestamp, self.timestamp) {
            (Some(next), Some(prev)) => next <= prev,
            (Some(_), None) => false,
            (None, _) => self.state == TargetState::Locked,
        }
    }
}
