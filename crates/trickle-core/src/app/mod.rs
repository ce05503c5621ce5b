//! App - アプリケーション層
//!
//! ports と coalescer / batch adapter を組み合わせます。
//!
//! # 主要コンポーネント
//! - **EnhancerBuilder / Enhancer**: 起動時に 1 度だけ構築するコンテキスト
//! - **DisplayBoard**: 解決済みの値を表示先と tooltip に反映
//! - **TrickleConfig**: TOML 設定
//! - **Status**: カウンタのビュー

pub mod config;
pub mod context;
pub mod display;
pub mod status;

// 主要な型を再エクスポート
pub use self::config::{ConfigError, TrickleConfig};
pub use self::context::{BuildError, Enhancer, EnhancerBuilder};
pub use self::display::{DisplayBoard, Location};
pub use self::status::Status;
