//! Backlog counter + high-water mark.

/// Queued/in-flight work counter.
///
/// Invariant: `high_water` is reset exactly when `current` returns to 0
/// (or when the epoch is cancelled). It measures growth above `baseline`,
/// the items still outstanding from a cancelled epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Backlog {
    current: usize,
    high_water: usize,
    baseline: usize,
}

impl Backlog {
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    pub fn is_idle(&self) -> bool {
        self.current == 0
    }

    pub fn increment(&mut self) {
        self.current += 1;
        self.high_water = self.high_water.max(self.current - self.baseline);
    }

    /// Decrement; returns the epoch watermark when the backlog drains.
    pub fn decrement(&mut self) -> Option<usize> {
        self.current = self.current.saturating_sub(1);
        // 古い epoch の分から先に減ったとみなす
        self.baseline = self.baseline.min(self.current);
        if self.current == 0 {
            Some(std::mem::take(&mut self.high_water))
        } else {
            None
        }
    }

    /// Forget the watermark without touching the in-flight count.
    ///
    /// Items still outstanding become the baseline, so the next epoch only
    /// counts work admitted after this call.
    pub fn reset_watermark(&mut self) -> usize {
        self.baseline = self.current;
        std::mem::take(&mut self.high_water)
    }
}
