//! Test doubles shared by the in-module tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{
    BatchRequest, BatchResponseItem, BindOptions, ContentHash, EffectError, Target,
    TransportError,
};
use crate::ports::{BatchTransport, TargetEffect};

/// Records every bind/unbind call and the options of the latest bind.
#[derive(Default)]
pub struct RecordingEffect {
    calls: Mutex<Vec<(&'static str, String)>>,
    bound: Mutex<HashMap<String, BindOptions>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingEffect {
    pub fn binds(&self) -> usize {
        self.count("bind")
    }

    pub fn unbinds(&self) -> usize {
        self.count("unbind")
    }

    pub fn options_of(&self, key: &str) -> Option<BindOptions> {
        self.bound.lock().unwrap().get(key).cloned()
    }

    pub fn fail_on(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(recorded, _)| *recorded == op)
            .count()
    }
}

impl TargetEffect for Arc<RecordingEffect> {
    fn bind(&self, target: &Target, options: &BindOptions) -> Result<(), EffectError> {
        let key = target.key.to_string();
        self.calls.lock().unwrap().push(("bind", key.clone()));
        if self.failing.lock().unwrap().contains(&key) {
            return Err(EffectError::Bind {
                target: key,
                message: "widget exploded".into(),
            });
        }
        self.bound.lock().unwrap().insert(key, options.clone());
        Ok(())
    }

    fn unbind(&self, target: &Target) -> Result<(), EffectError> {
        let key = target.key.to_string();
        self.calls.lock().unwrap().push(("unbind", key.clone()));
        self.bound.lock().unwrap().remove(&key);
        Ok(())
    }

    fn is_bound(&self, target: &Target) -> bool {
        self.bound.lock().unwrap().contains_key(target.key.as_str())
    }
}

/// Answers every sealed value with `plain:<sealed>` and counts requests.
#[derive(Default)]
pub struct EchoTransport {
    pub requests: Mutex<Vec<Vec<String>>>,
}

impl EchoTransport {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl BatchTransport for Arc<EchoTransport> {
    async fn fetch(&self, request: BatchRequest) -> Result<Vec<BatchResponseItem>, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push(request.sealed_data.clone());
        Ok(request
            .sealed_data
            .iter()
            .map(|sealed| BatchResponseItem {
                hash: ContentHash::of(sealed).to_string(),
                data: format!("plain:{sealed}"),
                meta_data: None,
            })
            .collect())
    }
}
