//! Cooperative shutdown for the worker binaries.

use std::time::Duration;

use log::info;
use tokio_util::sync::CancellationToken;

/// How long in-flight handlers get to finish after cancellation. Nothing is forcibly killed;
/// anything still un-acked after this window is recovered later via the reclaim cycle.
pub const DRAIN_WINDOW: Duration = Duration::from_secs(3);

/// Waits for SIGINT or SIGTERM, cancels the token, then sleeps out the drain window.
pub async fn wait_for_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("🛑️ Shutdown signal received, draining");
    cancel.cancel();
    tokio::time::sleep(DRAIN_WINDOW).await;
}
