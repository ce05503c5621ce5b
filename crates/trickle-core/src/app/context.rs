//! Enhancer - coalescer / resolver / cache をまとめたコンテキスト
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - グローバル状態の代わりに、起動時に 1 度だけ作って参照で渡す

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::app::config::TrickleConfig;
use crate::app::display::DisplayBoard;
use crate::app::status::Status;
use crate::batch::{BatchResolver, ResolveHandle, ResultCache};
use crate::coalescer::{EpochWaiter, SubmitReport, TaskCoalescer};
use crate::domain::{SealedItem, SubmitOptions, Target};
use crate::impls::TokioScheduler;
use crate::ports::{
    BatchTransport, Clock, IdGenerator, Scheduler, SystemClock, TargetEffect, UlidGenerator,
};

/// BuildError はコンテキスト構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no effect registered; call `effect()` before `build()`")]
    MissingEffect,

    #[error("no transport registered; call `transport()` before `build()`")]
    MissingTransport,

    #[error("no tokio runtime registered or running; call `runtime()` or build inside a runtime")]
    MissingRuntime,

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// EnhancerBuilder は Enhancer を構築
///
/// # 使用例
/// ```ignore
/// let enhancer = EnhancerBuilder::new(config)
///     .effect(TooltipEffect::new())
///     .transport(HttpTransport::new(endpoint, timeout)?)
///     .build()?;
/// ```
pub struct EnhancerBuilder<E, T> {
    config: TrickleConfig,
    effect: Option<E>,
    transport: Option<T>,
    scheduler: Option<Arc<dyn Scheduler>>,
    runtime: Option<Handle>,
    clock: Option<Arc<dyn Clock>>,
    cache: Option<ResultCache>,
}

impl<E: TargetEffect, T: BatchTransport> EnhancerBuilder<E, T> {
    pub fn new(config: TrickleConfig) -> Self {
        Self {
            config,
            effect: None,
            transport: None,
            scheduler: None,
            runtime: None,
            clock: None,
            cache: None,
        }
    }

    pub fn effect(mut self, effect: E) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn transport(mut self, transport: T) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Runtime the batch requests are spawned on. Defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Defaults to a `TokioScheduler` on the batch runtime.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Defaults to `SystemClock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing cache (e.g. across page reloads in one session).
    pub fn cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// # 検証
    /// - config の値（chunk_size, batch_size, class_prefix）
    /// - effect / transport が登録されているか
    /// - tokio ランタイムが登録されているか、build 時に動いているか
    pub fn build(self) -> Result<Enhancer<E, T>, BuildError> {
        self.config
            .validate()
            .map_err(|err| BuildError::InvalidConfig(err.to_string()))?;
        let effect = self.effect.ok_or(BuildError::MissingEffect)?;
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| BuildError::MissingRuntime)?,
        };
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TokioScheduler::with_handle(runtime.clone())));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let cache = self.cache.unwrap_or_default();

        let coalescer = TaskCoalescer::new(
            effect,
            scheduler,
            self.config.coalescer_config(),
            self.config.bind_defaults(),
        );
        let board = Arc::new(DisplayBoard::new(coalescer.clone(), Arc::clone(&clock)));
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(ClockRef(clock)));
        let resolver = BatchResolver::new(
            transport,
            cache.clone(),
            board.clone(),
            ids,
            self.config.batch_config(),
            runtime,
        );

        Ok(Enhancer {
            config: self.config,
            coalescer,
            resolver,
            board,
            cache,
        })
    }
}

/// Lets a shared clock drive the `UlidGenerator`.
struct ClockRef(Arc<dyn Clock>);

impl Clock for ClockRef {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.0.now()
    }
}

/// Enhancer はアプリケーション起動時に 1 度だけ作るコンテキスト
///
/// coalescer・resolver・キャッシュ・表示ボードを保持し、必要な側へ参照で渡します。
pub struct Enhancer<E, T> {
    config: TrickleConfig,
    coalescer: TaskCoalescer<E>,
    resolver: BatchResolver<T>,
    board: Arc<DisplayBoard<E>>,
    cache: ResultCache,
}

impl<E: TargetEffect, T: BatchTransport> Enhancer<E, T> {
    pub fn config(&self) -> &TrickleConfig {
        &self.config
    }

    pub fn coalescer(&self) -> &TaskCoalescer<E> {
        &self.coalescer
    }

    pub fn resolver(&self) -> &BatchResolver<T> {
        &self.resolver
    }

    pub fn board(&self) -> &DisplayBoard<E> {
        &self.board
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn submit<I>(&self, targets: I, options: SubmitOptions) -> SubmitReport
    where
        I: IntoIterator,
        I::Item: Into<Target>,
    {
        self.coalescer.submit(targets, options)
    }

    pub fn cancel_epoch(&self) -> usize {
        self.coalescer.cancel_epoch()
    }

    pub fn subscribe(&self) -> EpochWaiter {
        self.coalescer.subscribe()
    }

    pub fn resolve_all<I>(&self, items: I) -> ResolveHandle
    where
        I: IntoIterator<Item = SealedItem>,
    {
        self.resolver.resolve_all(items)
    }

    pub fn status(&self) -> Status {
        Status {
            coalescer: self.coalescer.stats(),
            resolver: self.resolver.stats(),
            unresolved_locations: self.board.unresolved().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TargetKey;
    use crate::impls::ManualScheduler;
    use crate::testing::{EchoTransport, RecordingEffect};

    type TestEnhancer = Enhancer<Arc<RecordingEffect>, Arc<EchoTransport>>;

    fn builder() -> EnhancerBuilder<Arc<RecordingEffect>, Arc<EchoTransport>> {
        EnhancerBuilder::new(TrickleConfig::default())
    }

    #[test]
    fn build_requires_effect_and_transport() {
        let missing_effect = builder()
            .transport(Arc::new(EchoTransport::default()))
            .scheduler(Arc::new(ManualScheduler::new()))
            .build();
        assert!(matches!(missing_effect, Err(BuildError::MissingEffect)));

        let missing_transport = builder()
            .effect(Arc::new(RecordingEffect::default()))
            .scheduler(Arc::new(ManualScheduler::new()))
            .build();
        assert!(matches!(missing_transport, Err(BuildError::MissingTransport)));
    }

    #[test]
    fn build_without_runtime_is_rejected() {
        let result = builder()
            .effect(Arc::new(RecordingEffect::default()))
            .transport(Arc::new(EchoTransport::default()))
            .build();
        assert!(matches!(result, Err(BuildError::MissingRuntime)));

        // scheduler があっても batch の spawn 先が無ければ同じ
        let result = builder()
            .effect(Arc::new(RecordingEffect::default()))
            .transport(Arc::new(EchoTransport::default()))
            .scheduler(Arc::new(ManualScheduler::new()))
            .build();
        assert!(matches!(result, Err(BuildError::MissingRuntime)));
    }

    #[test]
    fn explicit_runtime_lets_resolve_all_run_from_any_thread() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let transport = Arc::new(EchoTransport::default());
        let enhancer: TestEnhancer = builder()
            .effect(Arc::new(RecordingEffect::default()))
            .transport(Arc::clone(&transport))
            .scheduler(Arc::new(ManualScheduler::new()))
            .runtime(runtime.handle().clone())
            .build()
            .unwrap();
        enhancer.board().place("loc", "[sealed]", None);

        let handle = enhancer.resolve_all([SealedItem::new("loc", "s1")]);
        runtime.block_on(handle.settled());

        assert_eq!(transport.request_count(), 1);
        assert_eq!(enhancer.resolver().in_flight(), 0);
        assert_eq!(enhancer.board().text_of(&"loc".into()).as_deref(), Some("plain:s1"));

        // 2 回目はキャッシュから即時反映
        let again = enhancer.resolve_all([SealedItem::new("loc", "s1")]);
        assert_eq!(again.immediate(), 1);
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn build_rejects_invalid_config() {
        let mut config = TrickleConfig::default();
        config.batch.batch_size = 0;
        let result: Result<TestEnhancer, _> = EnhancerBuilder::new(config)
            .effect(Arc::new(RecordingEffect::default()))
            .transport(Arc::new(EchoTransport::default()))
            .scheduler(Arc::new(ManualScheduler::new()))
            .build();
        assert!(matches!(result, Err(BuildError::InvalidConfig(msg)) if msg.contains("batch_size")));
    }

    #[tokio::test]
    async fn resolved_values_refresh_grouped_tooltips() {
        let effect = Arc::new(RecordingEffect::default());
        let transport = Arc::new(EchoTransport::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let enhancer: TestEnhancer = builder()
            .effect(Arc::clone(&effect))
            .transport(Arc::clone(&transport))
            .scheduler(scheduler.clone())
            .build()
            .unwrap();

        let group: TargetKey = "musician-3".into();
        enhancer.board().place("musician-3-iban", "[sealed]", Some(group.clone()));
        enhancer.board().place("musician-3-note", "[sealed]", Some(group.clone()));
        enhancer.board().place("musician-4-iban", "[sealed]", None);

        let handle = enhancer.resolve_all([
            SealedItem::new("musician-3-iban", "c1"),
            SealedItem::new("musician-3-note", "c2"),
            SealedItem::new("musician-4-iban", "c1"),
        ]);
        handle.settled().await;

        let waiter = enhancer.subscribe();
        scheduler.run_until_idle();

        assert_eq!(transport.request_count(), 1);
        assert_eq!(
            enhancer.board().text_of(&"musician-4-iban".into()).as_deref(),
            Some("plain:c1")
        );
        assert_eq!(
            effect.options_of("musician-3").unwrap().text.as_deref(),
            Some("plain:c1\nplain:c2")
        );
        assert_eq!(waiter.wait().await, Ok(1));

        let status = enhancer.status();
        assert!(status.is_idle());
        assert_eq!(status.unresolved_locations, 0);
        assert_eq!(status.resolver.cached, 2);
        assert_eq!(status.resolver.coalesced, 1);
    }

    #[tokio::test]
    async fn default_scheduler_uses_the_tokio_runtime() {
        let effect = Arc::new(RecordingEffect::default());
        let enhancer: TestEnhancer = builder()
            .effect(Arc::clone(&effect))
            .transport(Arc::new(EchoTransport::default()))
            .build()
            .unwrap();

        let waiter = enhancer.subscribe();
        enhancer.submit(
            [Target::new("a"), Target::new("b")],
            SubmitOptions::default(),
        );

        assert_eq!(waiter.wait().await, Ok(2));
        assert_eq!(effect.binds(), 2);
    }
}
