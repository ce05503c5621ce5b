//! ResolutionSink port - 解決済みの値を表示先へ反映
//!
//! 同じ値を表示している location が複数ある場合、location ごとに 1 回呼ばれます。

use crate::domain::{LocationKey, ResolvedValue};

pub trait ResolutionSink: Send + Sync {
    fn apply(&self, location: &LocationKey, value: &ResolvedValue);
}
