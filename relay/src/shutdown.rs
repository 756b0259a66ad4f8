//! Waits for the process's external stop signal (§5: "SIGINT/SIGTERM when
//! graceful mode is enabled, or a fatal error on any runtime").

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Resolves on `SIGINT`, `SIGTERM` (Unix only), or `root` being cancelled by
/// something else in the runtime tree (a fatal error reported by a
/// transport). Whichever fires first wins; the others are simply dropped.
pub async fn wait(root: &CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                    _ = root.cancelled() => info!("shutting down after a fatal runtime error"),
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to install SIGTERM handler, watching SIGINT only");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                    _ = root.cancelled() => info!("shutting down after a fatal runtime error"),
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received Ctrl+C"),
            _ = root.cancelled() => info!("shutting down after a fatal runtime error"),
        }
    }
}
