//! Batch fetch adapter: resolve sealed values with few round trips.
//!
//! # フロー
//! 1. キャッシュ済みの hash は sink に即時反映
//! 2. 送信中（in flight）の hash は待ち手として追加するだけ（single-flight）
//! 3. 残りを `batch_size` ごとに分け、1 バッチ = 1 リクエストで spawn
//! 4. 成功: キャッシュに書き込み、待ち手全員へ反映 / 失敗: ログのみ（次回再試行）
//!
//! バッチは構築時に受け取った runtime `Handle` に spawn するので、
//! `resolve_all` 自体はどのスレッドから呼んでも構いません。
//! バッチのタスクが決着せずに終わった場合（transport の panic、runtime の停止）も
//! `BatchTask` の drop で in-flight から外れ、次回の呼び出しで再送されます。
//!
//! キャッシュ確認と in-flight 登録は同じロックの中で行うので、
//! 同じ hash がリクエストに乗るのはキャッシュが生きている間に高々 1 回です。

mod cache;

pub use cache::ResultCache;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::{
    BatchId, BatchRequest, BatchResponseItem, ContentHash, LocationKey, ResolveId, ResolvedValue,
    SealedItem, TransportError,
};
use crate::ports::{BatchTransport, IdGenerator, ResolutionSink};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Maximum distinct sealed values per request.
    pub batch_size: usize,
    /// Shared metadata sent with every request.
    pub meta_data: serde_json::Value,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            meta_data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Lock-free counters for status views.
#[derive(Debug, Default)]
struct ResolverMetrics {
    requests: AtomicU64,
    failed_requests: AtomicU64,
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
    resolved: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverStats {
    pub requests: u64,
    pub failed_requests: u64,
    pub cache_hits: u64,
    pub coalesced: u64,
    pub resolved: u64,
    pub cached: usize,
    pub in_flight: usize,
}

/// What happened to one outbound batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub requested: usize,
    pub resolved: usize,
    pub failed: bool,
}

/// Handle for the batches spawned by one `resolve_all` call.
///
/// Dropping it does not cancel anything.
#[derive(Debug)]
pub struct ResolveHandle {
    resolve_id: ResolveId,
    immediate: usize,
    batches: Vec<JoinHandle<BatchReport>>,
}

impl ResolveHandle {
    pub fn resolve_id(&self) -> ResolveId {
        self.resolve_id
    }

    /// Items answered from the cache without a request.
    pub fn immediate(&self) -> usize {
        self.immediate
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Wait for every batch of this call.
    pub async fn settled(self) -> Vec<BatchReport> {
        let mut reports = Vec::with_capacity(self.batches.len());
        for batch in self.batches {
            match batch.await {
                Ok(report) => reports.push(report),
                Err(err) => warn!(resolve_id = %self.resolve_id, error = %err, "batch task aborted"),
            }
        }
        reports
    }
}

struct ResolverInner<T> {
    transport: T,
    cache: ResultCache,
    sink: Arc<dyn ResolutionSink>,
    ids: Arc<dyn IdGenerator>,
    config: BatchConfig,
    runtime: Handle,
    /// hash -> locations waiting for it.
    in_flight: Mutex<HashMap<ContentHash, Vec<LocationKey>>>,
    metrics: ResolverMetrics,
}

/// Resolves sealed values through a `BatchTransport`.
pub struct BatchResolver<T> {
    inner: Arc<ResolverInner<T>>,
}

impl<T> Clone for BatchResolver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: BatchTransport> BatchResolver<T> {
    pub fn new(
        transport: T,
        cache: ResultCache,
        sink: Arc<dyn ResolutionSink>,
        ids: Arc<dyn IdGenerator>,
        config: BatchConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                transport,
                cache,
                sink,
                ids,
                config,
                runtime,
                in_flight: Mutex::new(HashMap::new()),
                metrics: ResolverMetrics::default(),
            }),
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.inner.cache
    }

    pub fn in_flight(&self) -> usize {
        self.inner.lock_in_flight().len()
    }

    pub fn stats(&self) -> ResolverStats {
        let metrics = &self.inner.metrics;
        ResolverStats {
            requests: metrics.requests.load(Ordering::Relaxed),
            failed_requests: metrics.failed_requests.load(Ordering::Relaxed),
            cache_hits: metrics.cache_hits.load(Ordering::Relaxed),
            coalesced: metrics.coalesced.load(Ordering::Relaxed),
            resolved: metrics.resolved.load(Ordering::Relaxed),
            cached: self.inner.cache.len(),
            in_flight: self.in_flight(),
        }
    }

    /// Resolve `items`; cached values are applied before this returns,
    /// everything else is fetched in the background on the resolver's runtime.
    pub fn resolve_all<I>(&self, items: I) -> ResolveHandle
    where
        I: IntoIterator<Item = SealedItem>,
    {
        let resolve_id = self.inner.ids.generate_resolve_id();
        let mut immediate = Vec::new();
        let mut to_fetch: Vec<(ContentHash, String)> = Vec::new();
        {
            let mut in_flight = self.inner.lock_in_flight();
            for item in items {
                if let Some(value) = self.inner.cache.get(&item.content_hash) {
                    immediate.push((item.location, value));
                    continue;
                }
                match in_flight.entry(item.content_hash.clone()) {
                    Entry::Occupied(mut waiters) => {
                        waiters.get_mut().push(item.location);
                        self.inner.metrics.coalesced.fetch_add(1, Ordering::Relaxed);
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(vec![item.location]);
                        to_fetch.push((item.content_hash, item.sealed_value));
                    }
                }
            }
        }

        self.inner
            .metrics
            .cache_hits
            .fetch_add(immediate.len() as u64, Ordering::Relaxed);
        for (location, value) in &immediate {
            self.inner.sink.apply(location, value);
        }

        let batches = to_fetch
            .chunks(self.inner.config.batch_size.max(1))
            .map(|chunk| {
                let task = BatchTask {
                    inner: Arc::clone(&self.inner),
                    resolve_id,
                    chunk: chunk.to_vec(),
                };
                self.inner.runtime.spawn(task.run())
            })
            .collect::<Vec<_>>();

        debug!(
            %resolve_id,
            immediate = immediate.len(),
            fetching = to_fetch.len(),
            batches = batches.len(),
            "resolve_all"
        );
        ResolveHandle {
            resolve_id,
            immediate: immediate.len(),
            batches,
        }
    }
}

/// One spawned batch. Owns the chunk until the request settles.
struct BatchTask<T: BatchTransport> {
    inner: Arc<ResolverInner<T>>,
    resolve_id: ResolveId,
    chunk: Vec<(ContentHash, String)>,
}

impl<T: BatchTransport> BatchTask<T> {
    async fn run(mut self) -> BatchReport {
        let inner = Arc::clone(&self.inner);
        let batch_id = inner.ids.generate_batch_id();
        let request = BatchRequest {
            sealed_data: self.chunk.iter().map(|(_, sealed)| sealed.clone()).collect(),
            meta_data: inner.config.meta_data.clone(),
        };
        inner.metrics.requests.fetch_add(1, Ordering::Relaxed);
        debug!(resolve_id = %self.resolve_id, %batch_id, size = self.chunk.len(), "sending batch");

        let result = inner.transport.fetch(request).await;
        let chunk = std::mem::take(&mut self.chunk);
        match result {
            Ok(results) => inner.complete(batch_id, chunk, results),
            Err(err) => inner.fail(batch_id, chunk, err),
        }
    }
}

impl<T: BatchTransport> Drop for BatchTask<T> {
    fn drop(&mut self) {
        if self.chunk.is_empty() {
            return;
        }
        {
            let mut in_flight = self.inner.lock_in_flight();
            for (hash, _) in &self.chunk {
                in_flight.remove(hash);
            }
        }
        self.inner
            .metrics
            .failed_requests
            .fetch_add(1, Ordering::Relaxed);
        warn!(
            resolve_id = %self.resolve_id,
            size = self.chunk.len(),
            "batch ended without a response"
        );
    }
}

impl<T: BatchTransport> ResolverInner<T> {
    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<ContentHash, Vec<LocationKey>>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cache and fan out results in response order.
    fn complete(
        &self,
        batch_id: BatchId,
        chunk: Vec<(ContentHash, String)>,
        results: Vec<BatchResponseItem>,
    ) -> BatchReport {
        let requested = chunk.len();
        let mut deliveries = Vec::with_capacity(requested);
        {
            let mut in_flight = self.lock_in_flight();
            let mut results = results.into_iter();
            for (hash, _) in chunk {
                let waiters = in_flight.remove(&hash).unwrap_or_default();
                let Some(item) = results.next() else {
                    warn!(%batch_id, %hash, "no result returned for sealed value");
                    continue;
                };
                if item.hash != hash.as_str() {
                    debug!(%batch_id, requested = %hash, returned = %item.hash, "server hash differs");
                }
                let value = self.cache.insert(ResolvedValue {
                    hash,
                    data: item.data,
                    meta_data: item.meta_data,
                });
                deliveries.push((value, waiters));
            }
        }

        let resolved = deliveries.len();
        self.metrics
            .resolved
            .fetch_add(resolved as u64, Ordering::Relaxed);
        for (value, waiters) in &deliveries {
            for location in waiters {
                self.sink.apply(location, value);
            }
        }
        debug!(%batch_id, requested, resolved, "batch resolved");
        BatchReport {
            batch_id,
            requested,
            resolved,
            failed: false,
        }
    }

    /// Forget the waiters; nothing is cached so a later call retries.
    fn fail(
        &self,
        batch_id: BatchId,
        chunk: Vec<(ContentHash, String)>,
        err: TransportError,
    ) -> BatchReport {
        {
            let mut in_flight = self.lock_in_flight();
            for (hash, _) in &chunk {
                in_flight.remove(hash);
            }
        }
        self.metrics.failed_requests.fetch_add(1, Ordering::Relaxed);
        warn!(
            %batch_id,
            status = ?err.status(),
            parsed = err.parsed(),
            error = %err,
            "batch request failed"
        );
        BatchReport {
            batch_id,
            requested: chunk.len(),
            resolved: 0,
            failed: true,
        }
    }
}
