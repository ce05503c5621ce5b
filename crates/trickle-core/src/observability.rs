//! tracing subscriber の初期化
//!
//! `RUST_LOG` があればそれを優先し、無ければ `default_filter` を使います。

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// Returns `false` when a subscriber was already installed (e.g. by the host).
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
