use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use agentz_daemon::{DaemonConfig, run_server};

/// Worker chunk ingester for the agentz control plane.
#[derive(Debug, Parser)]
#[command(name = "agentz-daemon", version)]
struct Args {
    /// Repository the control plane manages.
    #[arg(long, default_value = ".")]
    repo_root: PathBuf,

    /// Address to listen on. Port 0 picks a free port; the bound address
    /// is written to `.control-plane/ingester.addr` either way.
    #[arg(long, default_value = "127.0.0.1:7465")]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let runtime = match agentz_config::load_hierarchy() {
        Ok(config) => config.runtime,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let repo_root = match args.repo_root.canonicalize() {
        Ok(root) => root,
        Err(e) => {
            eprintln!("Cannot resolve repo root '{}': {}", args.repo_root.display(), e);
            std::process::exit(1);
        }
    };

    let config = DaemonConfig {
        repo_root,
        bind_addr: args.bind,
        runtime,
    };

    if let Err(e) = run_server(config).await {
        eprintln!("Ingester failed: {}", e);
        std::process::exit(1);
    }
}
