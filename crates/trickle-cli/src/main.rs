//! trickle-cli: coalescer と batch resolver を端から端まで動かすデモ
//!
//! ```text
//! trickle-cli [config.toml]
//! ```
//! `transport.endpoint` が設定されていれば HTTP で解決し、無ければプロセス内の
//! デモ用 transport を使います。

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::time::{Duration, sleep, timeout};
use tracing::{error, info, warn};

use trickle_core::app::{EnhancerBuilder, TrickleConfig};
use trickle_core::domain::{
    BatchRequest, BatchResponseItem, BindOptions, ContentHash, EffectError, SealedItem,
    SubmitOptions, Target, TargetKey, TransportError,
};
use trickle_core::impls::HttpTransport;
use trickle_core::observability::init_tracing;
use trickle_core::ports::{BatchTransport, TargetEffect};

const ROWS: usize = 25;
const EPOCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Logs every tooltip it would attach.
#[derive(Default)]
struct LoggingEffect {
    bound: Mutex<HashSet<TargetKey>>,
}

impl LoggingEffect {
    fn bound(&self) -> std::sync::MutexGuard<'_, HashSet<TargetKey>> {
        self.bound.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TargetEffect for LoggingEffect {
    fn bind(&self, target: &Target, options: &BindOptions) -> Result<(), EffectError> {
        info!(
            target_key = %target.key,
            placement = ?options.placement,
            classes = ?options.css_classes,
            text = options.text.as_deref().unwrap_or(""),
            "tooltip bound"
        );
        self.bound().insert(target.key.clone());
        Ok(())
    }

    fn unbind(&self, target: &Target) -> Result<(), EffectError> {
        self.bound().remove(&target.key);
        Ok(())
    }

    fn is_bound(&self, target: &Target) -> bool {
        self.bound().contains(&target.key)
    }
}

/// Pretends to decrypt by wrapping the sealed value.
struct DemoTransport {
    latency: Duration,
}

#[async_trait]
impl BatchTransport for DemoTransport {
    async fn fetch(&self, request: BatchRequest) -> Result<Vec<BatchResponseItem>, TransportError> {
        sleep(self.latency).await;
        Ok(request
            .sealed_data
            .iter()
            .map(|sealed| BatchResponseItem {
                hash: ContentHash::of(sealed).to_string(),
                data: format!("plain({sealed})"),
                meta_data: None,
            })
            .collect())
    }
}

enum CliTransport {
    Http(HttpTransport),
    Demo(DemoTransport),
}

#[async_trait]
impl BatchTransport for CliTransport {
    async fn fetch(&self, request: BatchRequest) -> Result<Vec<BatchResponseItem>, TransportError> {
        match self {
            CliTransport::Http(http) => http.fetch(request).await,
            CliTransport::Demo(demo) => demo.fetch(request).await,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(error = %err, "trickle-cli failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info,trickle_core=debug");

    // (A) 設定を読み込む（引数 → TRICKLE_CONFIG → 既定値）
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = TrickleConfig::load(path.as_deref())?;

    let transport = match &config.transport.endpoint {
        Some(endpoint) => {
            info!(%endpoint, "using http transport");
            CliTransport::Http(HttpTransport::new(
                endpoint.clone(),
                config.transport_timeout(),
            )?)
        }
        None => {
            info!("no endpoint configured, using demo transport");
            CliTransport::Demo(DemoTransport {
                latency: Duration::from_millis(20),
            })
        }
    };

    // (B) Enhancer を 1 度だけ作る
    let enhancer = EnhancerBuilder::new(config)
        .effect(LoggingEffect::default())
        .transport(transport)
        .build()?;

    // (C) 行ごとの tooltip を投入し、epoch の完了を待つ
    let waiter = enhancer.subscribe();
    let targets = (0..ROWS).map(|row| {
        let target = Target::new(format!("row-{row}"));
        if row % 5 == 0 {
            target.with_class("tooltip-top")
        } else {
            target
        }
    });
    let report = enhancer.submit(targets, SubmitOptions::default().with_text("loading…"));
    info!(queued = report.queued, "submitted row tooltips");
    match timeout(EPOCH_TIMEOUT, waiter.wait()).await {
        Ok(Ok(watermark)) => info!(watermark, "initial tooltips attached"),
        Ok(Err(err)) => warn!(error = %err, "initial epoch did not drain"),
        Err(_) => warn!("timed out waiting for initial tooltips"),
    }

    // (D) sealed 値を配置して解決。重複した値は 1 回しか送らない
    let mut items = Vec::with_capacity(ROWS * 2);
    for row in 0..ROWS {
        let group = TargetKey::new(format!("row-{row}"));
        let iban = format!("row-{row}-iban");
        let bic = format!("row-{row}-bic");
        enhancer.board().place(iban.as_str(), "••••", Some(group.clone()));
        enhancer.board().place(bic.as_str(), "••••", Some(group));
        items.push(SealedItem::new(iban.as_str(), format!("sealed-iban-{}", row % 7)));
        items.push(SealedItem::new(bic.as_str(), format!("sealed-bic-{}", row % 3)));
    }

    let waiter = enhancer.subscribe();
    let reports = enhancer.resolve_all(items).settled().await;
    let failed = reports.iter().filter(|report| report.failed).count();
    info!(batches = reports.len(), failed, "sealed values settled");

    if reports.iter().any(|report| report.resolved > 0) {
        match timeout(EPOCH_TIMEOUT, waiter.wait()).await {
            Ok(Ok(watermark)) => info!(watermark, "tooltips refreshed"),
            Ok(Err(err)) => warn!(error = %err, "refresh epoch did not drain"),
            Err(_) => warn!("timed out waiting for tooltip refresh"),
        }
    }

    // (E) 最終状態を JSON で出力
    println!("{}", serde_json::to_string_pretty(&enhancer.status())?);
    Ok(())
}
