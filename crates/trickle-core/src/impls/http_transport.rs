//! HttpTransport - reqwest によるバッチ送信
//!
//! 1 バッチにつき 1 回の POST。タイムアウトは reqwest クライアント側の設定のみです。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::domain::{BatchRequest, BatchResponseItem, TransportError};
use crate::ports::BatchTransport;

pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Network(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn fetch(&self, request: BatchRequest) -> Result<Vec<BatchResponseItem>, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|err| format!("<unreadable body: {err}>"));
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        serde_json::from_slice(&body).map_err(|err| TransportError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let transport =
            HttpTransport::new("http://127.0.0.1:9/decrypt", Duration::from_millis(500)).unwrap();
        let request = BatchRequest {
            sealed_data: vec!["x".into()],
            meta_data: serde_json::json!({}),
        };

        let err = transport.fetch(request).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
        assert!(!err.parsed());
        assert_eq!(err.status(), None);
    }
}
