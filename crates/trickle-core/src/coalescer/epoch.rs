//! EpochSignal - epoch カウンタ + subscribe/notify
//!
//! 1 つの future を毎回差し替えるのではなく、epoch ごとに購読者リストを持ち、
//! epoch の終わり（drain / cancel）で全員に一度だけ通知して次の epoch に進みます。

use tokio::sync::oneshot;

use crate::domain::{EpochOutcome, TrickleError};

#[derive(Debug, Default)]
pub struct EpochSignal {
    epoch: u64,
    subscribers: Vec<oneshot::Sender<EpochOutcome>>,
}

impl EpochSignal {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn subscribe(&mut self) -> EpochWaiter {
        let (tx, rx) = oneshot::channel();
        self.subscribers.push(tx);
        EpochWaiter {
            epoch: self.epoch,
            rx,
        }
    }

    pub fn drained(&mut self, watermark: usize) -> EpochOutcome {
        self.finish(EpochOutcome::Drained {
            epoch: self.epoch,
            watermark,
        })
    }

    pub fn cancelled(&mut self, watermark: usize) -> EpochOutcome {
        self.finish(EpochOutcome::Cancelled {
            epoch: self.epoch,
            watermark,
        })
    }

    fn finish(&mut self, outcome: EpochOutcome) -> EpochOutcome {
        for tx in self.subscribers.drain(..) {
            // 購読者が drop 済みなら無視
            let _ = tx.send(outcome);
        }
        self.epoch += 1;
        outcome
    }
}

/// Handle returned by `subscribe`; resolves when the epoch it was taken in ends.
#[derive(Debug)]
pub struct EpochWaiter {
    epoch: u64,
    rx: oneshot::Receiver<EpochOutcome>,
}

impl EpochWaiter {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Raw outcome of the epoch.
    pub async fn outcome(self) -> Result<EpochOutcome, TrickleError> {
        self.rx.await.map_err(|_| TrickleError::SignalClosed)
    }

    /// Watermark on drain, `EpochCancelled` on cancellation.
    pub async fn wait(self) -> Result<usize, TrickleError> {
        match self.outcome().await? {
            EpochOutcome::Drained { watermark, .. } => Ok(watermark),
            EpochOutcome::Cancelled { epoch, watermark } => {
                Err(TrickleError::EpochCancelled { epoch, watermark })
            }
        }
    }

    /// Non-blocking check, `None` while the epoch is still running.
    pub fn try_outcome(&mut self) -> Option<Result<EpochOutcome, TrickleError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(Ok(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TrickleError::SignalClosed)),
        }
    }
}
