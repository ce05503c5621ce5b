//! trickle-core
//!
//! 大量の DOM 風ターゲットへの tooltip 付与を小分けにして実行する coalescer と、
//! sealed 値をまとめて解決する batch fetch adapter。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, target, options, sealed, epoch, errors）
//! - **ports**: 抽象化レイヤー（Clock, Scheduler, TargetEffect, BatchTransport, ResolutionSink, IdGenerator）
//! - **coalescer**: TaskCoalescer（mark table, backlog, epoch signal）
//! - **batch**: BatchResolver と ResultCache
//! - **impls**: 実装（TokioScheduler, ManualScheduler, HttpTransport）
//! - **app**: 設定・表示ボード・Enhancer（起動時コンテキスト）・status
//! - **observability**: tracing の初期化

pub mod domain;
pub mod ports;
pub mod coalescer;
pub mod batch;
pub mod impls;
pub mod app;
pub mod observability;

#[cfg(test)]
mod testing;
