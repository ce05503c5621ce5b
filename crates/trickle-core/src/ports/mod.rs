//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! coalescer と batch adapter は外部（UI ウィジェット、タイマー、HTTP）を
//! すべてここの trait 越しに使います。

pub mod clock;
pub mod effect;
pub mod id_generator;
pub mod scheduler;
pub mod sink;
pub mod transport;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::effect::TargetEffect;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::scheduler::{Job, Scheduler};
pub use self::sink::ResolutionSink;
pub use self::transport::BatchTransport;
