//! BatchTransport port - リモートの解決エンドポイント
//!
//! 1 バッチにつき 1 リクエスト。タイムアウトは transport 側の責務で、
//! adapter はクライアント側タイムアウトを持ちません。

use async_trait::async_trait;

use crate::domain::{BatchRequest, BatchResponseItem, TransportError};

#[async_trait]
pub trait BatchTransport: Send + Sync + 'static {
    /// Resolve one batch. The response holds one item per sealed value,
    /// in request order.
    async fn fetch(&self, request: BatchRequest) -> Result<Vec<BatchResponseItem>, TransportError>;
}
