//! Logging bootstrap
//!
//! The loader only emits `tracing` events. Applications that do not install
//! their own subscriber can call [`init`] once at startup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "info,graph_batch_loader=debug";

/// Install a fmt subscriber filtered by `RUST_LOG`, or by `default_directive`
///
/// Returns false if a global subscriber was already set.
pub fn init(default_directive: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .try_init()
        .is_ok()
}

/// [`init`] with [`DEFAULT_DIRECTIVE`]
pub fn init_default() -> bool {
    init(DEFAULT_DIRECTIVE)
}
