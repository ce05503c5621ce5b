//! ResultCache - content hash → 解決済みの値
//!
//! # 特性
//! - 上限なし、セッション中は evict しない
//! - 最初に入った値が勝つ（一度キャッシュされた値は不変）
//! - 成功した fetch だけがエントリを作る
//!
//! DashMap なので spawn されたバッチから並行に書き込めます。

use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::{ContentHash, ResolvedValue};

/// Shared cache; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: Arc<DashMap<ContentHash, ResolvedValue>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &ContentHash) -> Option<ResolvedValue> {
        self.entries.get(hash).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Insert unless present; returns the value now cached for `hash`.
    pub fn insert(&self, value: ResolvedValue) -> ResolvedValue {
        self.entries
            .entry(value.hash.clone())
            .or_insert(value)
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry (explicit session reset by the host).
    pub fn clear(&self) {
        self.entries.clear();
    }
}
