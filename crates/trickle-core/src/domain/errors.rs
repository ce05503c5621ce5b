//! Errors - エラー型と分類
//!
//! # 分類
//! - **EffectError**: effect（bind/unbind）の失敗。ログに残してキュー処理は継続
//! - **TransportError**: バッチ送信の失敗。ログに残して未解決のまま（次回再試行）
//! - **TrickleError**: epoch の購読者に返るエラー（キャンセルはここ）

use thiserror::Error;

/// Failure reported by a `TargetEffect`.
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("bind failed for target={target}: {message}")]
    Bind { target: String, message: String },

    #[error("unbind failed for target={target}: {message}")]
    Unbind { target: String, message: String },
}

/// Failure reported by a `BatchTransport`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("batch request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error("batch request failed: {0}")]
    Network(String),

    /// A response arrived but could not be parsed.
    #[error("batch response could not be decoded: {0}")]
    Decode(String),
}

impl TransportError {
    /// Did the transport get far enough to parse a response?
    pub fn parsed(&self) -> bool {
        matches!(self, TransportError::Status { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrickleError {
    #[error("epoch {epoch} was cancelled at watermark {watermark}")]
    EpochCancelled { epoch: u64, watermark: usize },

    #[error("completion signal closed before the epoch ended")]
    SignalClosed,
}
