//! Sealed values - リモートで解決が必要な不透明な値
//!
//! # Wire format
//! ```text
//! POST  { "sealedData": ["..."], "metaData": {...} }
//! 200   [ { "hash": "...", "data": "...", "metaData": {...}? }, ... ]
//! ```
//! レスポンスは入力と同じ順序で 1 値につき 1 要素です。

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fmt::Write as _;

/// Identifier of one display location showing a sealed value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationKey(String);

impl LocationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Cache key derived from a sealed value's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Lowercase hex SHA-256 of the sealed value.
    pub fn of(sealed_value: &str) -> Self {
        let digest = Sha256::digest(sealed_value.as_bytes());
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest.iter() {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentHash {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One display location asking for its sealed value to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedItem {
    pub location: LocationKey,
    pub sealed_value: String,
    pub content_hash: ContentHash,
}

impl SealedItem {
    /// Item whose hash is computed from the sealed value.
    pub fn new(location: impl Into<LocationKey>, sealed_value: impl Into<String>) -> Self {
        let sealed_value = sealed_value.into();
        let content_hash = ContentHash::of(&sealed_value);
        Self {
            location: location.into(),
            sealed_value,
            content_hash,
        }
    }

    /// Item with a hash supplied by the server-rendered page.
    pub fn with_hash(
        location: impl Into<LocationKey>,
        sealed_value: impl Into<String>,
        content_hash: impl Into<ContentHash>,
    ) -> Self {
        Self {
            location: location.into(),
            sealed_value: sealed_value.into(),
            content_hash: content_hash.into(),
        }
    }
}

/// A resolved (plain) value. Immutable once cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub hash: ContentHash,
    pub data: String,
    pub meta_data: Option<serde_json::Value>,
}

/// Outbound request body for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub sealed_data: Vec<String>,
    pub meta_data: serde_json::Value,
}

/// One element of the response array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponseItem {
    pub hash: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_hash_is_stable_hex_sha256() {
        let hash = ContentHash::of("abc");
        assert_eq!(
            hash.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(ContentHash::of("abc"), hash);
        assert_ne!(ContentHash::of("abd"), hash);
    }

    #[test]
    fn request_uses_camel_case_wire_names() {
        let request = BatchRequest {
            sealed_data: vec!["x".into()],
            meta_data: json!({ "table": "musicians" }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({ "sealedData": ["x"], "metaData": { "table": "musicians" } })
        );
    }

    #[test]
    fn response_meta_data_is_optional() {
        let items: Vec<BatchResponseItem> =
            serde_json::from_str(r#"[{"hash":"h1","data":"plain"}]"#).unwrap();
        assert_eq!(items[0].hash, "h1");
        assert_eq!(items[0].meta_data, None);
    }
}
