//! Graceful shutdown on SIGTERM/SIGINT.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn wait_for_shutdown_signal(token: CancellationToken) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!(event = "daemon.shutdown.signal", signal = "SIGTERM");
        }
        _ = sigint.recv() => {
            info!(event = "daemon.shutdown.signal", signal = "SIGINT");
        }
    }

    token.cancel();
    Ok(())
}
