//! Idempotent `tracing-subscriber` bring-up, driven by `RUST_LOG`.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs a formatting subscriber once per process. Safe to call from
/// more than one `App::run` in the same process (tests constructing several
/// apps in one binary, for instance) — every call after the first is a
/// no-op.
pub fn init() {
    if LOGGING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
