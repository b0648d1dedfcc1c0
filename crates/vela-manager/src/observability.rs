//! Tracing setup with a log filter that can be changed after startup.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Installs the global subscriber at `info`.
pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Installs the global subscriber. `RUST_LOG`, when set and valid, wins
/// over `level`. Later calls are no-ops.
pub fn init_tracing_with_level(level: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let (filter_layer, handle) = reload::Layer::new(filter);
    if FILTER_HANDLE.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Swaps the active filter for `level`, an `EnvFilter` directive string
/// such as `debug` or `vela_controller=trace,info`.
///
/// Leaves the filter alone when `RUST_LOG` is set.
pub fn apply_logging_level(level: &str) -> Result<(), String> {
    if std::env::var_os("RUST_LOG").is_some() {
        return Ok(());
    }
    let filter =
        EnvFilter::try_new(level).map_err(|e| format!("invalid log filter {level:?}: {e}"))?;
    if let Some(handle) = FILTER_HANDLE.get() {
        handle
            .reload(filter)
            .map_err(|e| format!("failed to reload log filter: {e}"))?;
    }
    Ok(())
}
