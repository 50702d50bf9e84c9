//! The ingester server: a TCP JSONL listener workers post chunk frames to.

pub mod connection;
mod shutdown;

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use agentz_config::RuntimeConfig;
use agentz_paths::ControlPlanePaths;
use agentz_store::EventStore;

use crate::errors::DaemonError;
use crate::pid;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub repo_root: PathBuf,
    pub bind_addr: SocketAddr,
    pub runtime: RuntimeConfig,
}

/// Run the ingester.
///
/// This is the main entrypoint called by `agentz-daemon`. It:
/// 1. Checks for an existing ingester (pid file)
/// 2. Writes the pid file and the bound-address file (`--stream-url` source)
/// 3. Binds the TCP listener
/// 4. Accepts worker connections in a loop
/// 5. Handles graceful shutdown on SIGTERM/SIGINT
pub async fn run_server(config: DaemonConfig) -> Result<(), DaemonError> {
    let paths = ControlPlanePaths::for_repo(&config.repo_root);
    let pid_path = paths.ingester_pid_file();

    if let Some(existing_pid) = pid::check_running(&pid_path) {
        return Err(DaemonError::AlreadyRunning(existing_pid));
    }
    pid::write_pid_file(&pid_path)?;

    let listener = TcpListener::bind(config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    std::fs::write(paths.ingester_addr_file(), format!("tcp://{}", local_addr))?;

    info!(
        event = "daemon.server.started",
        pid = std::process::id(),
        addr = %local_addr,
        repo_root = %config.repo_root.display(),
    );

    let store = EventStore::new(paths.clone());
    let shutdown = CancellationToken::new();

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown::wait_for_shutdown_signal(signal_shutdown).await {
            error!(
                event = "daemon.server.signal_handler_failed",
                error = %e,
                "SIGTERM/SIGINT will not trigger graceful shutdown.",
            );
        }
    });

    loop {
        tokio::select! {
            accept = listener.accept() => {
                match accept {
                    Ok((stream, peer)) => {
                        let store = store.clone();
                        let paths = paths.clone();
                        let runtime = config.runtime.clone();
                        let token = shutdown.clone();
                        tokio::spawn(async move {
                            connection::handle_connection(stream, peer, store, paths, runtime, token)
                                .await;
                        });
                    }
                    Err(e) => {
                        error!(event = "daemon.server.accept_failed", error = %e);
                    }
                }
            }
            _ = shutdown.cancelled() => {
                break;
            }
        }
    }

    pid::remove_pid_file(&pid_path);
    info!(event = "daemon.server.stopped", pid = std::process::id());
    Ok(())
}
